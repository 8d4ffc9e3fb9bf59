//! Timer service behavior: recurring drift tolerance, one-shot expiry,
//! schedule-in-past rejection, and the built-in TIMER/DELTIMER commands.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use famulus::{
    Args, Command, CommandParams, CommandRegistry, Config, Event, HandlerFn, HandlerSync,
    NullRegistry, Runtime, TimerError, Topic,
};
use tokio::time::{sleep, timeout};

fn runtime() -> Runtime {
    Runtime::init(Config::default(), Arc::new(NullRegistry)).expect("init")
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let result = timeout(Duration::from_secs(5), async {
        while !cond() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}

/// Registry that keeps registered commands around for invocation.
#[derive(Default)]
struct RecordingRegistry {
    commands: Mutex<Vec<Command>>,
}

impl RecordingRegistry {
    fn names(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    fn get(&self, name: &str) -> Option<Command> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }
}

impl CommandRegistry for RecordingRegistry {
    fn register_command(&self, cmd: Command) {
        self.commands.lock().unwrap().push(cmd);
    }

    fn unregister_command(&self, name: &str) {
        self.commands.lock().unwrap().retain(|c| c.name() != name);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn recurring_timer_fires_within_drift_window() {
    let rt = runtime();
    let ticks: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let handler_ticks = Arc::clone(&ticks);
    rt.subscribe(
        Topic::TextInput,
        HandlerFn::arc(move |_rt: Runtime, event: Arc<Event>, _sync: Arc<HandlerSync>| {
            let ticks = Arc::clone(&handler_ticks);
            async move {
                ticks
                    .lock()
                    .unwrap()
                    .push(event.args.as_text().unwrap_or("").to_string());
            }
        }),
    );

    let id = rt.add_timer(Duration::from_millis(100), Topic::TextInput, Args::text("tick"));
    sleep(Duration::from_millis(550)).await;

    let count = ticks.lock().unwrap().len();
    assert!(
        (4..=6).contains(&count),
        "expected 4..=6 firings in 550ms, got {count}"
    );
    // Still registered: recurring timers survive firing.
    assert!(rt.timers().contains(&id));

    rt.quit().await;
    // Shutdown erases all timers.
    assert!(rt.timers().is_empty());
    rt.dispose().expect("dispose");
}

#[tokio::test(flavor = "multi_thread")]
async fn one_shot_timer_fires_once_and_is_removed() {
    let rt = runtime();
    let heard: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let handler_heard = Arc::clone(&heard);
    rt.subscribe(
        Topic::TextInput,
        HandlerFn::arc(move |_rt: Runtime, event: Arc<Event>, _sync: Arc<HandlerSync>| {
            let heard = Arc::clone(&handler_heard);
            async move {
                heard
                    .lock()
                    .unwrap()
                    .push(event.args.as_text().unwrap_or("").to_string());
            }
        }),
    );

    let id = rt.delay(Duration::from_millis(50), Topic::TextInput, Args::text("once"));
    assert!(rt.timers().contains(&id));

    sleep(Duration::from_millis(200)).await;
    let observed = heard.lock().unwrap().clone();
    assert_eq!(observed, vec!["once"]);
    assert!(!rt.timers().contains(&id));

    rt.quit().await;
    rt.dispose().expect("dispose");
}

#[tokio::test(flavor = "multi_thread")]
async fn schedule_in_the_past_registers_nothing() {
    let rt = runtime();

    let past = SystemTime::now() - Duration::from_secs(1);
    let err = rt
        .schedule(past, Topic::TextInput, Args::text("never"))
        .unwrap_err();
    assert_eq!(err, TimerError::ScheduleInPast);
    assert!(rt.timers().is_empty());

    rt.quit().await;
    rt.dispose().expect("dispose");
}

#[tokio::test(flavor = "multi_thread")]
async fn schedule_in_the_future_behaves_as_delay() {
    let rt = runtime();
    let heard: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let handler_heard = Arc::clone(&heard);
    rt.subscribe(
        Topic::TextInput,
        HandlerFn::arc(move |_rt: Runtime, event: Arc<Event>, _sync: Arc<HandlerSync>| {
            let heard = Arc::clone(&handler_heard);
            async move {
                heard
                    .lock()
                    .unwrap()
                    .push(event.args.as_text().unwrap_or("").to_string());
            }
        }),
    );

    let at = SystemTime::now() + Duration::from_millis(100);
    let id = rt
        .schedule(at, Topic::TextInput, Args::text("later"))
        .expect("schedule in the future");
    assert!(rt.timers().contains(&id));

    {
        let heard = Arc::clone(&heard);
        wait_until("scheduled event to fire", move || {
            !heard.lock().unwrap().is_empty()
        })
        .await;
    }
    assert!(!rt.timers().contains(&id));

    rt.quit().await;
    rt.dispose().expect("dispose");
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_timer_on_absent_id_fails_without_side_effects() {
    let rt = runtime();

    let keep = rt.add_timer(Duration::from_secs(60), Topic::TextInput, Args::Empty);
    let err = rt.remove_timer(keep + 1).unwrap_err();
    assert_eq!(err, TimerError::NoSuchTimer { id: keep + 1 });
    assert_eq!(rt.timers(), vec![keep]);

    rt.remove_timer(keep).expect("remove existing timer");
    assert!(rt.timers().is_empty());

    rt.quit().await;
    rt.dispose().expect("dispose");
}

#[tokio::test(flavor = "multi_thread")]
async fn timer_ids_are_unique_among_live_timers() {
    let rt = runtime();

    let a = rt.delay(Duration::from_secs(60), Topic::TextInput, Args::Empty);
    let b = rt.delay(Duration::from_secs(60), Topic::AgentSpeech, Args::Empty);
    let c = rt.add_timer(Duration::from_secs(60), Topic::TextInput, Args::Empty);

    let mut ids = vec![a, b, c];
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(rt.timers().len(), 3);

    rt.quit().await;
    rt.dispose().expect("dispose");
}

#[tokio::test(flavor = "multi_thread")]
async fn built_in_commands_register_at_init_and_unregister_at_quit() {
    let registry = Arc::new(RecordingRegistry::default());
    let rt = Runtime::init(Config::default(), Arc::clone(&registry) as Arc<dyn CommandRegistry>)
        .expect("init");

    let mut names = registry.names();
    names.sort_unstable();
    assert_eq!(names, vec!["DELTIMER".to_string(), "TIMER".to_string()]);

    rt.quit().await;
    assert!(registry.names().is_empty());
    rt.dispose().expect("dispose");
}

#[tokio::test(flavor = "multi_thread")]
async fn timer_command_arms_a_timer_that_replays_input() {
    let registry = Arc::new(RecordingRegistry::default());
    let rt = Runtime::init(Config::default(), Arc::clone(&registry) as Arc<dyn CommandRegistry>)
        .expect("init");
    let heard: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let handler_heard = Arc::clone(&heard);
    let handler_registry = Arc::clone(&registry);
    rt.subscribe(
        Topic::TextInput,
        HandlerFn::arc(move |rt: Runtime, event: Arc<Event>, sync: Arc<HandlerSync>| {
            let heard = Arc::clone(&handler_heard);
            let registry = Arc::clone(&handler_registry);
            async move {
                let text = event.args.as_text().unwrap_or("").to_string();
                heard.lock().unwrap().push(text.clone());
                if text == "go" {
                    let cmd = registry.get("TIMER").expect("TIMER registered");
                    let params = CommandParams::new(vec!["40".to_string(), "ping".to_string()]);
                    cmd.invoke(rt, params, sync).await;
                }
            }
        }),
    );

    rt.generate(Topic::TextInput, Args::text("go"));
    {
        let heard = Arc::clone(&heard);
        wait_until("armed timer to replay the command text", move || {
            heard.lock().unwrap().contains(&"ping".to_string())
        })
        .await;
    }

    rt.quit().await;
    rt.dispose().expect("dispose");
}
