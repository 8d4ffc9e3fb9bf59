//! Plugin manager behavior with compiled-in plugins: the enable/disable
//! lifecycle, misbehaviour isolation, and the loaded/enabled invariants.
//! Dynamic-library loading shares the same entry path and is exercised
//! against a directory with no loadable libraries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use famulus::{
    Args, Command, CommandRegistry, Config, Event, FunctionTable, HandlerFn, HandlerSync,
    LocalEnv, NullRegistry, PluginError, PluginInfo, Runtime, Topic,
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
}

impl CommandRegistry for RecordingRegistry {
    fn register_command(&self, cmd: Command) {
        self.commands.lock().unwrap().push(cmd);
    }

    fn unregister_command(&self, name: &str) {
        self.commands.lock().unwrap().retain(|c| c.name() != name);
    }
}

// ---- a well-behaved plugin ----

static GOOD_INITS: AtomicUsize = AtomicUsize::new(0);
static GOOD_QUITS: AtomicUsize = AtomicUsize::new(0);

fn good_init(_rt: &Runtime, env: &mut LocalEnv) -> i32 {
    GOOD_INITS.fetch_add(1, Ordering::SeqCst);
    *env = Some(Box::new(7u32));
    0
}

fn good_quit(_rt: &Runtime, env: &mut LocalEnv) -> i32 {
    // The sandbox installed at init must come back untouched.
    let value = env
        .as_ref()
        .and_then(|boxed| boxed.downcast_ref::<u32>())
        .copied();
    assert_eq!(value, Some(7));
    GOOD_QUITS.fetch_add(1, Ordering::SeqCst);
    0
}

fn good_add_commands(_rt: &Runtime, _env: &mut LocalEnv, out: &mut Vec<Command>) -> i32 {
    out.push(Command::new("GREET", "Says hello", "", |rt, _params, _sync| async move {
        rt.generate(Topic::AgentSpeech, Args::text("hello"));
    }));
    0
}

static GOOD: PluginInfo = PluginInfo {
    name: "good",
    version: "1.0.0",
    functions: FunctionTable {
        init: Some(good_init),
        quit: Some(good_quit),
        add_input_devices: None,
        add_output_devices: None,
        add_agent_props: None,
        add_commands: Some(good_add_commands),
    },
};

#[tokio::test(flavor = "multi_thread")]
async fn enable_disable_round_trip() {
    let registry = Arc::new(RecordingRegistry::default());
    let rt = Runtime::init(Config::default(), Arc::clone(&registry) as Arc<dyn CommandRegistry>)
        .expect("init");

    let id = rt.load_static_plugin(&GOOD).expect("load");
    assert_eq!(id, "good");
    assert!(rt.plugin_loaded("good"));
    assert!(!rt.plugin_enabled("good"));

    rt.enable_plugin("good").expect("enable");
    assert!(rt.plugin_enabled("good"));
    assert_eq!(GOOD_INITS.load(Ordering::SeqCst), 1);
    assert!(registry.names().contains(&"GREET".to_string()));

    rt.disable_plugin("good");
    assert!(!rt.plugin_enabled("good"));
    assert!(rt.plugin_loaded("good"));
    assert_eq!(GOOD_QUITS.load(Ordering::SeqCst), 1);

    // Disabling a not-enabled plugin is a no-op.
    rt.disable_plugin("good");
    assert_eq!(GOOD_QUITS.load(Ordering::SeqCst), 1);

    rt.unload_plugin("good");
    assert!(!rt.plugin_loaded("good"));
    assert!(rt.loaded_plugins().is_empty());

    rt.quit().await;
    rt.dispose().expect("dispose");
}

// ---- duplicate and state errors ----

static DUP: PluginInfo = PluginInfo {
    name: "dup",
    version: "0.1.0",
    functions: FunctionTable {
        init: None,
        quit: None,
        add_input_devices: None,
        add_output_devices: None,
        add_agent_props: None,
        add_commands: None,
    },
};

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_and_state_errors() {
    let rt = runtime();

    rt.load_static_plugin(&DUP).expect("first load");
    let err = rt.load_static_plugin(&DUP).unwrap_err();
    assert!(matches!(err, PluginError::AlreadyLoaded { .. }));

    let err = rt.enable_plugin("missing").unwrap_err();
    assert!(matches!(err, PluginError::NotLoaded { .. }));

    // A plugin with no init is enabled with a skip-warning.
    rt.enable_plugin("dup").expect("enable without init");
    let err = rt.enable_plugin("dup").unwrap_err();
    assert!(matches!(err, PluginError::AlreadyEnabled { .. }));

    rt.quit().await;
    rt.dispose().expect("dispose");
}

// ---- init returning non-zero leaves the plugin disabled ----

fn failing_init(_rt: &Runtime, _env: &mut LocalEnv) -> i32 {
    3
}

static BAD_INIT: PluginInfo = PluginInfo {
    name: "bad-init",
    version: "0.1.0",
    functions: FunctionTable {
        init: Some(failing_init),
        quit: None,
        add_input_devices: None,
        add_output_devices: None,
        add_agent_props: None,
        add_commands: None,
    },
};

#[tokio::test(flavor = "multi_thread")]
async fn init_failure_leaves_plugin_loaded_but_disabled() {
    let rt = runtime();

    rt.load_static_plugin(&BAD_INIT).expect("load");
    let err = rt.enable_plugin("bad-init").unwrap_err();
    assert!(matches!(err, PluginError::InitFailed { status: 3, .. }));
    assert!(rt.plugin_loaded("bad-init"));
    assert!(!rt.plugin_enabled("bad-init"));

    rt.quit().await;
    rt.dispose().expect("dispose");
}

// ---- add_commands panicking unloads the plugin, registers nothing ----

fn crash_init(_rt: &Runtime, _env: &mut LocalEnv) -> i32 {
    0
}

fn crash_add_commands(_rt: &Runtime, _env: &mut LocalEnv, out: &mut Vec<Command>) -> i32 {
    out.push(Command::new("BOOM", "Never registered", "", |_rt, _params, _sync| async {}));
    panic!("add_commands exploded");
}

static CRASHER: PluginInfo = PluginInfo {
    name: "crasher",
    version: "0.1.0",
    functions: FunctionTable {
        init: Some(crash_init),
        quit: None,
        add_input_devices: None,
        add_output_devices: None,
        add_agent_props: None,
        add_commands: Some(crash_add_commands),
    },
};

#[tokio::test(flavor = "multi_thread")]
async fn command_contribution_panic_unloads_plugin_and_keeps_runtime_healthy() {
    let registry = Arc::new(RecordingRegistry::default());
    let rt = Runtime::init(Config::default(), Arc::clone(&registry) as Arc<dyn CommandRegistry>)
        .expect("init");

    rt.load_static_plugin(&CRASHER).expect("load");
    let err = rt.enable_plugin("crasher").unwrap_err();
    assert!(matches!(
        err,
        PluginError::FuncPanicked {
            func: "add_commands",
            ..
        }
    ));
    assert!(!rt.plugin_loaded("crasher"));
    assert!(!rt.plugin_enabled("crasher"));
    assert!(!registry.names().contains(&"BOOM".to_string()));

    // The dispatch core is unaffected.
    let heard = Arc::new(Mutex::new(Vec::new()));
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
    rt.generate(Topic::TextInput, Args::text("still alive"));
    {
        let heard = Arc::clone(&heard);
        wait_until("dispatch to keep working", move || {
            !heard.lock().unwrap().is_empty()
        })
        .await;
    }

    rt.quit().await;
    rt.dispose().expect("dispose");
}

// ---- a non-zero device contribution aborts later calls, stays enabled ----

static PROPS_CALLS: AtomicUsize = AtomicUsize::new(0);

fn failing_devices(_rt: &Runtime, _env: &mut LocalEnv) -> i32 {
    1
}

fn counting_props(_rt: &Runtime, _env: &mut LocalEnv) -> i32 {
    PROPS_CALLS.fetch_add(1, Ordering::SeqCst);
    0
}

static HALF: PluginInfo = PluginInfo {
    name: "half",
    version: "0.1.0",
    functions: FunctionTable {
        init: None,
        quit: None,
        add_input_devices: Some(failing_devices),
        add_output_devices: None,
        add_agent_props: Some(counting_props),
        add_commands: None,
    },
};

#[tokio::test(flavor = "multi_thread")]
async fn failed_contribution_aborts_later_calls_but_stays_enabled() {
    let rt = runtime();

    rt.load_static_plugin(&HALF).expect("load");
    rt.enable_plugin("half").expect("enable");
    assert!(rt.plugin_enabled("half"));
    assert_eq!(PROPS_CALLS.load(Ordering::SeqCst), 0);

    rt.quit().await;
    rt.dispose().expect("dispose");
}

// ---- shutdown tears enabled plugins down ----

static TEARDOWN_QUITS: AtomicUsize = AtomicUsize::new(0);

fn teardown_quit(_rt: &Runtime, _env: &mut LocalEnv) -> i32 {
    TEARDOWN_QUITS.fetch_add(1, Ordering::SeqCst);
    0
}

static TEARDOWN: PluginInfo = PluginInfo {
    name: "teardown",
    version: "0.1.0",
    functions: FunctionTable {
        init: None,
        quit: Some(teardown_quit),
        add_input_devices: None,
        add_output_devices: None,
        add_agent_props: None,
        add_commands: None,
    },
};

#[tokio::test(flavor = "multi_thread")]
async fn quit_disables_and_unloads_remaining_plugins() {
    let rt = runtime();

    rt.load_static_plugin(&TEARDOWN).expect("load");
    rt.enable_plugin("teardown").expect("enable");

    rt.quit().await;
    assert_eq!(TEARDOWN_QUITS.load(Ordering::SeqCst), 1);
    assert!(rt.loaded_plugins().is_empty());
    rt.dispose().expect("dispose");
}

// ---- autoload scans only .so/.dll names ----

#[tokio::test(flavor = "multi_thread")]
async fn autoload_ignores_non_library_files_and_missing_dirs() {
    let dir = std::env::temp_dir().join(format!("famulus-plugins-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create plugin dir");
    std::fs::write(dir.join("notes.txt"), b"not a plugin").expect("write file");

    let mut cfg = Config::default();
    cfg.plugin_dir = Some(dir.clone());
    let rt = Runtime::init(cfg, Arc::new(NullRegistry)).expect("init");
    assert!(rt.loaded_plugins().is_empty());
    rt.quit().await;
    rt.dispose().expect("dispose");

    // A missing directory is logged, not fatal.
    let mut cfg = Config::default();
    cfg.plugin_dir = Some(dir.join("does-not-exist"));
    let rt = Runtime::init(cfg, Arc::new(NullRegistry)).expect("init");
    assert!(rt.loaded_plugins().is_empty());
    rt.quit().await;
    rt.dispose().expect("dispose");

    let _ = std::fs::remove_dir_all(&dir);
}
