use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stagehand::{handler, DeliveryError, Event, Flow, Process, ProcessRef, Scheduler, SchedulerConfig};

fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        queue_size: 16,
        number_of_workers: 2,
        process_queue_size: 8,
    }
}

#[derive(Debug, Clone)]
struct Request;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_failure_handler_that_itself_raises_is_escalated_to_dead_letter() {
    let scheduler = Scheduler::new(test_config()).await.unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let seen_handler = seen.clone();
    let dead_letter_ps = scheduler
        .context()
        .get_process_state(&ProcessRef::dead_letter())
        .unwrap();
    dead_letter_ps.process.switch(handler(move |e| {
        if let Event::DeadLetter(envelope, cause) = e {
            assert_eq!(envelope.sender, ProcessRef::new("client"));
            assert_eq!(envelope.receiver, ProcessRef::new("server"));
            assert!(matches!(**cause, DeliveryError::EventHandling { .. }));
            seen_handler.fetch_add(1, Ordering::SeqCst);
        }
        Some(Flow::unit())
    }));

    let server = Process::new(
        ProcessRef::new("server"),
        "server",
        handler(|e| match e {
            Event::User(u) if u.is::<Request>() => {
                Some(stagehand::eval(|| Err("server exploded".into())))
            }
            Event::Start => Some(Flow::unit()),
            _ => None,
        }),
    );
    scheduler.register_root(server).await.unwrap();

    let client = Process::new(
        ProcessRef::new("client"),
        "client",
        handler(|e| match e {
            Event::Start => Some(Flow::send(Event::user(Request), [ProcessRef::new("server")])),
            // Raises while handling the Failure bounced back from `server`: must escalate to
            // dead-letter rather than looping a Failure back to itself forever.
            Event::Failure(..) => Some(stagehand::eval(|| Err("client also exploded".into()))),
            _ => None,
        }),
    );
    scheduler.register_root(client).await.unwrap();

    let runner = tokio::spawn(scheduler.clone().run());
    tokio::time::sleep(Duration::from_millis(80)).await;
    scheduler.shutdown_handle().cancel();
    runner.await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
