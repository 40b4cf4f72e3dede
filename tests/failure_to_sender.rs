use std::time::Duration;

use stagehand::testing::Recorder;
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
async fn handler_failure_is_routed_back_to_the_sender() {
    let scheduler = Scheduler::new(test_config()).await.unwrap();

    let store: Recorder<(ProcessRef, ProcessRef)> = Recorder::new();
    let store_handler = store.clone();

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
        handler(move |e| match e {
            Event::Start => Some(Flow::send(Event::user(Request), [ProcessRef::new("server")])),
            Event::Failure(envelope, cause) => {
                assert!(matches!(**cause, DeliveryError::EventHandling { .. }));
                store_handler.push((envelope.sender.clone(), envelope.receiver.clone()));
                Some(Flow::unit())
            }
            _ => None,
        }),
    );
    scheduler.register_root(client).await.unwrap();

    let runner = tokio::spawn(scheduler.clone().run());
    tokio::time::sleep(Duration::from_millis(80)).await;
    scheduler.shutdown_handle().cancel();
    runner.await.unwrap();

    let recorded = store.snapshot();
    assert_eq!(recorded, vec![(ProcessRef::new("client"), ProcessRef::new("server"))]);
}
