//! End-to-end: a nested span plus a log message inside it produces the
//! exact ordered event sequence a subscriber is contractually guaranteed.

use std::sync::{Arc, Mutex};

use fimo_runtime::context::{self, ConfigRecord, TracingConfig};
use fimo_runtime::tracing::event_info::EventInfo;
use fimo_runtime::tracing::subscriber::{CallStackId, ExitReason, Subscriber, Timestamp};
use fimo_runtime::tracing::{self as tracing_mod, Level};

struct Recorder(Mutex<Vec<String>>);

impl Subscriber for Recorder {
    fn register_thread(&self, _time: Timestamp) {
        self.0.lock().unwrap().push("register_thread".to_owned());
    }

    fn unregister_thread(&self, _time: Timestamp) {
        self.0.lock().unwrap().push("unregister_thread".to_owned());
    }

    fn create_call_stack(&self, _time: Timestamp, _stack: CallStackId) {
        self.0.lock().unwrap().push("create_call_stack".to_owned());
    }

    fn resume_call_stack(&self, _time: Timestamp, _stack: CallStackId) {
        self.0.lock().unwrap().push("resume_call_stack".to_owned());
    }

    fn destroy_call_stack(&self, _time: Timestamp, _stack: CallStackId) {
        self.0.lock().unwrap().push("destroy_call_stack".to_owned());
    }

    fn declare_event_info(&self, _time: Timestamp, info: &'static EventInfo) {
        self.0.lock().unwrap().push(format!("declare:{}", info.name));
    }

    fn enter_span(&self, _time: Timestamp, _stack: CallStackId, info: &'static EventInfo, _message: &str) {
        self.0.lock().unwrap().push(format!("enter:{}", info.name));
    }

    fn exit_span(&self, _time: Timestamp, _stack: CallStackId, info: &'static EventInfo, reason: ExitReason) {
        assert_eq!(reason, ExitReason::Normal);
        self.0.lock().unwrap().push(format!("exit:{}", info.name));
    }

    fn log_message(
        &self,
        _time: Timestamp,
        _stack: CallStackId,
        info: &'static EventInfo,
        message: &str,
        span_chain: &[&'static EventInfo],
    ) {
        assert_eq!(message, "hello");
        assert_eq!(span_chain.len(), 2, "log sits inside both nested spans");
        self.0.lock().unwrap().push(format!("log:{}", info.name));
    }
}

static PARENT: EventInfo = EventInfo::new(file!(), line!(), "test", Level::Info, "parent");
static CHILD: EventInfo = EventInfo::new(file!(), line!(), "test", Level::Info, "child");
static MSG: EventInfo = EventInfo::new(file!(), line!(), "test", Level::Debug, "msg");

#[test]
fn nested_span_and_log_emit_in_order() {
    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    let handle = context::init(vec![ConfigRecord::TracingConfig(TracingConfig {
        max_level: Level::Trace,
        subscribers: vec![recorder.clone()],
        register_thread: false,
        ..TracingConfig::default()
    })])
    .expect("init with a fresh subscriber set must succeed");

    tracing_mod::register_thread();
    {
        let _parent = tracing_mod::SpanGuard::enter(&PARENT, "parent");
        {
            let _child = tracing_mod::SpanGuard::enter(&CHILD, "child");
            tracing_mod::log_message(&MSG, "hello");
        }
    }
    tracing_mod::unregister_thread();

    let events = recorder.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "register_thread",
            "create_call_stack",
            "resume_call_stack",
            "declare:parent",
            "enter:parent",
            "declare:child",
            "enter:child",
            "declare:msg",
            "log:msg",
            "exit:child",
            "exit:parent",
            "destroy_call_stack",
            "unregister_thread",
        ]
    );

    drop(handle);
    context::deinit();
}
