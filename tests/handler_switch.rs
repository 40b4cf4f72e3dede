use std::sync::{Arc, OnceLock};
use std::time::Duration;

use stagehand::testing::Recorder;
use stagehand::{handler, Envelope, Event, Flow, Process, ProcessRef, ProcessState, Scheduler, SchedulerConfig};

fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        queue_size: 16,
        number_of_workers: 2,
        process_queue_size: 8,
    }
}

#[derive(Debug, Clone)]
struct Init;

#[derive(Debug, Clone)]
struct Run;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn switching_handlers_changes_how_later_events_are_handled() {
    let scheduler = Scheduler::new(test_config()).await.unwrap();

    let recorder: Recorder<&'static str> = Recorder::new();
    let self_state: Arc<OnceLock<Arc<ProcessState>>> = Arc::new(OnceLock::new());

    let record_on_init = recorder.clone();
    let self_state_on_init = self_state.clone();
    let init_handler = handler(move |e| match e {
        Event::User(u) if u.is::<Init>() => {
            record_on_init.push("Init");
            if let Some(ps) = self_state_on_init.get() {
                let record_on_run = record_on_init.clone();
                ps.process.switch(handler(move |e| match e {
                    Event::User(u) if u.is::<Run>() => {
                        record_on_run.push("Run");
                        Some(Flow::unit())
                    }
                    Event::Start => Some(Flow::unit()),
                    _ => None,
                }));
            }
            Some(Flow::unit())
        }
        Event::Start => Some(Flow::unit()),
        _ => None,
    });

    let process_ref = ProcessRef::new("switcher");
    let process = Process::new(process_ref.clone(), "switcher", init_handler);
    scheduler.register_root(process).await.unwrap();
    let ps = scheduler.context().get_process_state(&process_ref).unwrap();
    self_state.set(ps).ok().expect("set once");

    let runner = tokio::spawn(scheduler.clone().run());

    scheduler
        .submit(Envelope::new(ProcessRef::system(), Event::user(Init), process_ref.clone()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    for _ in 0..2 {
        scheduler
            .submit(Envelope::new(ProcessRef::system(), Event::user(Run), process_ref.clone()))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(30)).await;

    scheduler.shutdown_handle().cancel();
    runner.await.unwrap();

    assert_eq!(recorder.snapshot(), vec!["Init", "Run", "Run"]);
}
