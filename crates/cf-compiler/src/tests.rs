use std::sync::{Arc, Mutex};

use cf_core::{FlowResult, Handler, Param, SessionRef, Value, Vars};
use cf_parser::normalize_flow;
use cf_runtime::{MemorySession, SessionEffect};
use serde_json::json;

use super::*;

fn compile(definition: DialogDefinition) -> CompiledDialog {
    compile_dialog(definition).expect("dialog should compile")
}

fn compile_error(definition: DialogDefinition) -> cf_core::FlowError {
    compile_dialog(definition).expect_err("dialog should not compile")
}

fn locals(value: Value) -> Vars {
    match value {
        Value::Object(map) => map,
        _ => Vars::new(),
    }
}

async fn dispatch(
    dialog: &CompiledDialog,
    key: &str,
    session: &Arc<MemorySession>,
    value: Option<Value>,
) -> FlowResult<()> {
    let session: SessionRef = session.clone();
    FlowRun::new(dialog.registry.clone(), session, value)
        .dispatch(key)
        .await
}

async fn start(dialog: &CompiledDialog, session: &Arc<MemorySession>) {
    let key = dialog.on_start.clone().expect("onStart key");
    dispatch(dialog, &key, session, None)
        .await
        .expect("onStart should run");
}

fn texts(session: &MemorySession) -> Vec<String> {
    session
        .messages()
        .iter()
        .map(|message| message["text"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &str) -> Param {
    let (log, name) = (log.clone(), name.to_string());
    Param::Handler(Handler::new(move |_vars, _session, _path| {
        log.lock().expect("log lock").push(name.clone());
        async { Ok(None) }
    }))
}

fn below(limit: f64) -> Param {
    Param::Handler(Handler::from_vars(move |vars| {
        json!(vars.get("i").and_then(Value::as_f64).unwrap_or(0.0) < limit)
    }))
}

fn counting_loop(body: Param) -> Param {
    Param::object([
        (
            "for",
            Param::array([Param::from(json!({"i": 1})), below(6.0), Param::from(json!({"i": 2}))]),
        ),
        ("do", body),
    ])
}

#[tokio::test]
async fn for_loop_sends_each_iteration_in_order() {
    let dialog = compile(DialogDefinition::new("D").on_start(counting_loop(Param::from("Hello {{i}}"))));
    let session = Arc::new(MemorySession::new("s1"));
    start(&dialog, &session).await;

    assert_eq!(texts(&session), vec!["Hello 1", "Hello 3", "Hello 5"]);
    assert_eq!(session.outcome().locals.get("i"), Some(&json!(7)));
}

#[tokio::test]
async fn long_loops_hand_over_without_nesting() {
    let looping = Param::object([
        (
            "for",
            Param::array([
                Param::from(json!({"i": 0})),
                below(10_000.0),
                Param::from(json!({"i": 1})),
            ]),
        ),
        ("do", Param::from(json!({"set": {"x": "{{i}}"}}))),
    ]);
    let dialog = compile(
        DialogDefinition::new("D").on_start(Param::array([looping, Param::from("done {{i}}")])),
    );
    let session = Arc::new(MemorySession::new("s1"));
    start(&dialog, &session).await;

    assert_eq!(texts(&session), vec!["done 10000"]);
    assert_eq!(session.outcome().locals.get("x"), Some(&json!("9999")));
}

#[tokio::test]
async fn flows_end_in_goto_for_their_continuation() {
    let dialog = compile(DialogDefinition::new("D").on_start(Param::array([
        Param::from(json!({"if": true, "then": "Yes"})),
        Param::from("After"),
    ])));
    let session: SessionRef = Arc::new(MemorySession::new("s1"));
    let run = FlowRun::new(dialog.registry.clone(), session, None);

    let entry = dialog.registry.get_flow_handler("D:onStart").expect("entry flow");
    assert_eq!(
        entry.run(run.clone()).await.expect("entry runs"),
        Signal::goto("D:onStart.if.then")
    );
    let then = dialog.registry.get_flow_handler("D:onStart.if.then").expect("then flow");
    assert_eq!(
        then.run(run.clone()).await.expect("then runs"),
        Signal::goto("D:onStart.flow1")
    );
    assert_eq!(run.invoke("D:onStart").await.expect("chain runs"), Signal::Next);
}

#[tokio::test(start_paused = true)]
async fn wait_sleeps_before_continuing() {
    let dialog = compile(DialogDefinition::new("D").on_start(Param::array([
        Param::from("Before"),
        Param::from(json!({"wait": "{{delay}}"})),
        Param::from("After"),
    ])));
    let session = Arc::new(MemorySession::new("s1").with_globals(locals(json!({"delay": 1500}))));
    let started = tokio::time::Instant::now();
    start(&dialog, &session).await;

    assert!(started.elapsed() >= std::time::Duration::from_millis(1500));
    assert_eq!(texts(&session), vec!["Before", "After"]);
}

#[tokio::test(start_paused = true)]
async fn wait_rejects_non_numeric_delays() {
    let dialog = compile(DialogDefinition::new("D").on_start(Param::array([
        Param::from(json!({"wait": "soon"})),
        Param::from("After"),
    ])));
    let session = Arc::new(MemorySession::new("s1"));
    let key = dialog.on_start.clone().expect("onStart key");
    let error = dispatch(&dialog, &key, &session, None)
        .await
        .expect_err("delay must be numeric");

    assert_eq!(error.code, "WAIT_PARAM_INVALID");
    assert!(session.messages().is_empty());
}

#[tokio::test]
async fn break_leaves_loop_before_increment_and_resumes_outer_flow() {
    let body = Param::array([Param::from("Hello {{i}}"), Param::from(json!({"break": true}))]);
    let dialog = compile(
        DialogDefinition::new("D").on_start(Param::array([counting_loop(body), Param::from("After")])),
    );
    let session = Arc::new(MemorySession::new("s1"));
    start(&dialog, &session).await;

    assert_eq!(texts(&session), vec!["Hello 1", "After"]);
    assert_eq!(session.outcome().locals, locals(json!({"i": 1})));
}

#[tokio::test]
async fn continue_skips_rest_of_body_but_still_increments() {
    let skip_three = Param::object([
        (
            "if",
            Param::Handler(Handler::from_vars(|vars| json!(vars.get("i") == Some(&json!(3))))),
        ),
        ("then", Param::from(json!({"continue": true}))),
    ]);
    let body = Param::array([skip_three, Param::from("Hello {{i}}")]);
    let dialog = compile(DialogDefinition::new("D").on_start(counting_loop(body)));
    let session = Arc::new(MemorySession::new("s1"));
    start(&dialog, &session).await;

    assert_eq!(texts(&session), vec!["Hello 1", "Hello 5"]);
}

#[tokio::test]
async fn switch_cases_fall_through_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let switch = Param::object([
        ("switch", Param::from("{{pick}}")),
        (
            "cases",
            Param::object([
                ("case1", recorder(&log, "case1")),
                ("case2", recorder(&log, "case2")),
                ("case3", recorder(&log, "case3")),
            ]),
        ),
    ]);
    let dialog = compile(DialogDefinition::new("D").on_start(switch));
    let session = Arc::new(MemorySession::new("s1").with_locals(locals(json!({"pick": "case1"}))));
    start(&dialog, &session).await;

    assert_eq!(*log.lock().expect("log lock"), vec!["case1", "case2", "case3"]);
}

#[tokio::test]
async fn switch_break_and_default() {
    let switch = json!({
        "switch": "{{pick}}",
        "cases": {
            "a": ["A", {"break": true}],
            "b": "B"
        },
        "default": "Default"
    });
    let dialog =
        compile(DialogDefinition::new("D").on_start(Param::array([Param::from(switch), Param::from("End")])));

    let session = Arc::new(MemorySession::new("s1").with_locals(locals(json!({"pick": "a"}))));
    start(&dialog, &session).await;
    assert_eq!(texts(&session), vec!["A", "End"]);

    let session = Arc::new(MemorySession::new("s2").with_locals(locals(json!({"pick": "b"}))));
    start(&dialog, &session).await;
    assert_eq!(texts(&session), vec!["B", "Default", "End"]);

    let session = Arc::new(MemorySession::new("s3").with_locals(locals(json!({"pick": "zzz"}))));
    start(&dialog, &session).await;
    assert_eq!(texts(&session), vec!["Default", "End"]);
}

#[tokio::test]
async fn conditional_runs_branch_then_continuation() {
    let raw = json!([{"if": "{{flag}}", "then": "Yes", "else": "No"}, "Done"]);
    let dialog = compile(DialogDefinition::new("D").on_start(raw));

    let session = Arc::new(MemorySession::new("s1").with_locals(locals(json!({"flag": true}))));
    start(&dialog, &session).await;
    assert_eq!(texts(&session), vec!["Yes", "Done"]);

    let session = Arc::new(MemorySession::new("s2").with_locals(locals(json!({"flag": false}))));
    start(&dialog, &session).await;
    assert_eq!(texts(&session), vec!["No", "Done"]);
}

#[tokio::test]
async fn start_then_is_bound_as_result_handler() {
    let raw = json!([{"start": "Child", "then": "Got {{value}}"}]);
    let dialog = compile(DialogDefinition::new("D").on_start(raw));
    let session = Arc::new(MemorySession::new("s1"));
    start(&dialog, &session).await;

    let tag = "D:onStart.start.then";
    assert_eq!(
        session.effect(),
        Some(SessionEffect::Start {
            dialog: "Child".to_string(),
            tag: Some(tag.to_string()),
            locals: None,
        })
    );
    assert!(session.messages().is_empty());

    let flow = dialog
        .registry
        .result_handler("Child", tag)
        .expect("result handler")
        .to_string();
    let resumed = Arc::new(MemorySession::new("s1"));
    dispatch(&dialog, &flow, &resumed, Some(json!("R")))
        .await
        .expect("result flow runs");
    assert_eq!(texts(&resumed), vec!["Got R"]);
}

#[tokio::test]
async fn computed_start_binds_wildcard_result() {
    let raw = json!({"start": "{{target}}"});
    let dialog = compile(DialogDefinition::new("D").on_start(raw));
    assert_eq!(
        dialog.registry.result_handler("Anything", "D:onStart.start.then"),
        Some("D:onStart.start.then")
    );

    let session = Arc::new(MemorySession::new("s1").with_locals(locals(json!({"target": "Quiz"}))));
    start(&dialog, &session).await;
    assert!(matches!(
        session.effect(),
        Some(SessionEffect::Start { dialog, .. }) if dialog == "Quiz"
    ));
}

#[tokio::test]
async fn static_actions_register_payload_and_postback_handlers() {
    let raw = json!([
        {
            "text": "Continue?",
            "actions": {
                "Yes": {"then": "You said yes"},
                "More": {"type": "postback", "then": "More info"},
                "Site": {"uri": "https://example.com"}
            }
        },
        "Bye"
    ]);
    let dialog = compile(DialogDefinition::new("D").on_start(raw));
    let session = Arc::new(MemorySession::new("s1"));
    start(&dialog, &session).await;

    assert_eq!(
        session.messages(),
        vec![json!({
            "type": "text",
            "text": "Continue?",
            "actions": [
                {"type": "reply", "text": "Yes", "payload": "D:onStart.text.Yes"},
                {"type": "postback", "text": "More", "postback": "D:onStart.text.More"},
                {"type": "link", "text": "Site", "uri": "https://example.com"}
            ]
        })]
    );

    let registry = &dialog.registry;
    let reply = registry.payload_handler("D:onStart.text.Yes").expect("payload").to_string();
    let resumed = Arc::new(MemorySession::new("s1"));
    dispatch(&dialog, &reply, &resumed, None).await.expect("reply flow");
    assert_eq!(texts(&resumed), vec!["You said yes", "Bye"]);

    let postback = registry.postback_handler("D:onStart.text.More").expect("postback").to_string();
    let resumed = Arc::new(MemorySession::new("s1"));
    dispatch(&dialog, &postback, &resumed, None).await.expect("postback flow");
    assert_eq!(texts(&resumed), vec!["More info"]);
    assert!(registry.postback_handler("D:onStart.text.Site").is_none());
}

#[tokio::test]
async fn dynamic_actions_without_replies_continue_immediately() {
    let links = Handler::from_vars(|_| json!([{"text": "Site", "uri": "https://example.com"}]));
    let message = Param::object([("text", Param::from("Pick")), ("actions", Param::Handler(links))]);
    let dialog = compile(DialogDefinition::new("D").on_start(Param::array([message, Param::from("After")])));
    let session = Arc::new(MemorySession::new("s1"));
    start(&dialog, &session).await;

    assert_eq!(texts(&session), vec!["Pick", "After"]);
    assert_eq!(session.messages()[0]["actions"][0]["type"], json!("link"));
}

#[tokio::test]
async fn dynamic_replies_resume_through_message_flow() {
    let replies = Handler::from_vars(|_| json!(["Red", {"text": "Blue", "thenFlow": "colors"}]));
    let message = Param::object([("text", Param::from("Pick")), ("actions", Param::Handler(replies))]);
    let dialog = compile(
        DialogDefinition::new("D")
            .flow("colors", "Nice color")
            .on_start(Param::array([message, Param::from("After")])),
    );
    let session = Arc::new(MemorySession::new("s1"));
    start(&dialog, &session).await;

    assert_eq!(texts(&session), vec!["Pick"]);
    let actions = &session.messages()[0]["actions"];
    assert_eq!(actions[0], json!({"text": "Red", "type": "reply", "payload": "D:onStart.text"}));
    assert_eq!(actions[1]["payload"], json!("D:colors"));
    assert_eq!(dialog.registry.payload_route("D:colors"), Some("D:colors"));
    assert_eq!(dialog.registry.postback_route("D:colors"), Some("D:colors"));
    assert_eq!(dialog.registry.payload_route("D:missing"), None);

    let resume = dialog
        .registry
        .payload_handler("D:onStart.text")
        .expect("resume payload")
        .to_string();
    let resumed = Arc::new(MemorySession::new("s1"));
    dispatch(&dialog, &resume, &resumed, None).await.expect("resume flow");
    assert_eq!(texts(&resumed), vec!["After"]);
}

#[tokio::test]
async fn dynamic_action_with_unknown_then_flow_fails_at_run_time() {
    let replies = Handler::from_vars(|_| json!([{"text": "Go", "thenFlow": "missing"}]));
    let message = Param::object([("text", Param::from("Pick")), ("actions", Param::Handler(replies))]);
    let dialog = compile(DialogDefinition::new("D").on_start(message));
    let session = Arc::new(MemorySession::new("s1"));
    let key = dialog.on_start.clone().expect("onStart key");
    let error = dispatch(&dialog, &key, &session, None)
        .await
        .expect_err("unknown route should fail");
    assert_eq!(error.code, "FLOW_HANDLER_UNDEFINED");
    assert!(session.messages().is_empty());
}

#[tokio::test]
async fn item_actions_default_to_postback() {
    let raw = json!({
        "type": "list",
        "items": {
            "Tea": {"actions": {"Order": {"then": "Tea ordered"}}}
        }
    });
    let dialog = compile(DialogDefinition::new("D").on_start(raw));
    let session = Arc::new(MemorySession::new("s1"));
    start(&dialog, &session).await;

    let item = &session.messages()[0]["items"][0];
    assert_eq!(item["text"], json!("Tea"));
    assert_eq!(item["actions"][0]["postback"], json!("D:onStart.list.Tea.Order"));
    assert!(dialog.registry.has_flow("D:onStart.list.Tea.Order"));
}

#[tokio::test]
async fn intents_and_global_flows_are_registered() {
    let dialog = compile(
        DialogDefinition::new("D")
            .flow("#shared", "Shared")
            .intent("help", "Helping")
            .on_default("Sorry?"),
    );
    assert_eq!(dialog.intent_key("help"), Some("D:intent.help"));
    assert_eq!(dialog.on_default.as_deref(), Some("D:onDefault"));
    assert!(dialog.registry.has_flow("D:shared"));

    let session = Arc::new(MemorySession::new("s1"));
    dispatch(&dialog, "intent.help", &session, None).await.expect("intent");
    assert_eq!(texts(&session), vec!["Helping"]);
}

#[test]
fn duplicate_flow_keys_are_rejected() {
    let raw = json!([
        {"type": "flow", "id": "x", "flow": "a"},
        {"type": "flow", "id": "x", "flow": "b"}
    ]);
    let error = compile_error(DialogDefinition::new("D").on_start(raw));
    assert_eq!(error.code, "FLOW_KEY_DUPLICATE");
    assert_eq!(error.key.as_deref(), Some("D:onStart.x"));
}

#[test]
fn loop_signals_outside_loops_are_rejected() {
    for raw in [json!({"break": true}), json!(["Hi", {"continue": true}])] {
        let error = compile_error(DialogDefinition::new("D").on_start(raw));
        assert_eq!(error.code, "FLOW_BREAK_OUTSIDE_LOOP");
    }
}

#[test]
fn undefined_then_flow_suggests_nearest_key() {
    let raw = json!({"text": "Hi", "actions": {"Go": {"thenFlow": "shraed"}}});
    let error = compile_error(
        DialogDefinition::new("D")
            .flow("shared", "Shared")
            .on_start(raw),
    );
    assert_eq!(error.code, "FLOW_HANDLER_UNDEFINED");
    assert!(error.message.contains("Did you mean \"D:shared\"?"), "{}", error.message);
    assert!(error.message.contains("onStart.text.Go"), "{}", error.message);
}

#[test]
fn flow_breakers_follow_command_kind() {
    let flow = normalize_flow(&Param::from(json!([
        "plain",
        {"text": "Ask", "actions": {"Yes": {"then": "ok"}}},
        {"text": "Visit", "actions": {"Site": {"uri": "https://example.com"}}},
        {"set": {"a": 1}},
        {"if": true, "then": "x"},
        {"finish": null}
    ])))
    .expect("flow normalizes");
    let breakers = flow.commands.iter().map(is_flow_breaker).collect::<Vec<_>>();
    assert_eq!(breakers, vec![false, true, false, false, true, true]);
}

#[test]
fn continuations_are_numbered_per_dialog() {
    let raw = json!([
        {"if": true, "then": "a"},
        "b",
        {"if": true, "then": "c"},
        "d"
    ]);
    let dialog = compile(DialogDefinition::new("D").on_start(raw));
    let keys = dialog.registry.flow_keys().collect::<Vec<_>>();
    assert!(keys.contains(&"D:onStart.flow1"), "{:?}", keys);
    assert!(keys.contains(&"D:onStart.flow1.flow2"), "{:?}", keys);
    assert!(keys.contains(&"D:onStart.if.then"), "{:?}", keys);
    assert!(keys.contains(&"D:onStart.flow1.if.then"), "{:?}", keys);
}
