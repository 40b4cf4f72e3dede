use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stagehand::{handler, DeliveryError, Envelope, Event, Flow, Process, ProcessRef, Scheduler, SchedulerConfig};

fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        queue_size: 16,
        number_of_workers: 2,
        // One slot per mailbox: the scenario under test.
        process_queue_size: 1,
    }
}

#[derive(Debug, Clone)]
struct NamedRequest(&'static str);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn third_send_overflows_a_one_slot_mailbox() {
    let scheduler = Scheduler::new(test_config()).await.unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let seen_handler = seen.clone();
    let dead_letter_ps = scheduler
        .context()
        .get_process_state(&ProcessRef::dead_letter())
        .unwrap();
    dead_letter_ps.process.switch(handler(move |e| {
        if let Event::DeadLetter(envelope, cause) = e {
            if let Event::User(u) = &envelope.event {
                if let Some(NamedRequest(name)) = u.downcast_ref() {
                    assert_eq!(*name, "3");
                    assert!(matches!(**cause, DeliveryError::EventDelivery(_)));
                    seen_handler.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        Some(Flow::unit())
    }));

    // Busy-loops on every NamedRequest: long enough to hold the lock while "2" and "3" land.
    let server = Process::new(
        ProcessRef::new("server"),
        "server",
        handler(|e| match e {
            Event::User(u) if u.is::<NamedRequest>() => {
                Some(Flow::delay(Duration::from_millis(200), None))
            }
            Event::Start => Some(Flow::unit()),
            _ => None,
        }),
    );
    scheduler.register_root(server).await.unwrap();

    let runner = tokio::spawn(scheduler.clone().run());

    // Let the synthetic `Start` this process received on registration fully drain, so its
    // one-slot mailbox is empty before "1" arrives.
    tokio::time::sleep(Duration::from_millis(30)).await;

    scheduler
        .submit(Envelope::new(
            ProcessRef::new("client"),
            Event::user(NamedRequest("1")),
            ProcessRef::new("server"),
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    scheduler
        .submit(Envelope::new(
            ProcessRef::new("client"),
            Event::user(NamedRequest("2")),
            ProcessRef::new("server"),
        ))
        .await
        .unwrap();
    scheduler
        .submit(Envelope::new(
            ProcessRef::new("client"),
            Event::user(NamedRequest("3")),
            ProcessRef::new("server"),
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    scheduler.shutdown_handle().cancel();
    runner.await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
