use std::sync::Arc;

use async_trait::async_trait;
use cf_core::{
    ActionType, Actions, Command, FlowId, FlowPath, FlowResult, Handler, Items, MessageKind, Param,
    Session, SessionRef, StartTarget, Value, Vars,
};
use serde_json::json;

use super::*;

struct NullSession;

#[async_trait]
impl Session for NullSession {
    fn id(&self) -> String {
        "null".to_string()
    }
    fn globals(&self) -> Vars {
        Vars::new()
    }
    fn locals(&self) -> Vars {
        Vars::new()
    }
    fn volatiles(&self) -> Vars {
        Vars::new()
    }
    async fn set(&self, _values: Vars) -> FlowResult<()> {
        Ok(())
    }
    async fn save(&self, _values: Option<Vars>) -> FlowResult<()> {
        Ok(())
    }
    async fn send(&self, _message: Value) -> FlowResult<()> {
        Ok(())
    }
    async fn start(&self, _dialog: &str, _tag: Option<&str>, _locals: Option<Vars>) -> FlowResult<()> {
        Ok(())
    }
    async fn finish(&self, _result: Value) -> FlowResult<()> {
        Ok(())
    }
}

fn raw(value: Value) -> Param {
    Param::from(value)
}

fn vars(value: Value) -> Vars {
    match value {
        Value::Object(map) => map,
        _ => Vars::new(),
    }
}

async fn call(param: &Param, env: Value) -> Option<Value> {
    let handler = param.as_handler().expect("param should be a handler");
    let session: SessionRef = Arc::new(NullSession);
    handler
        .call(vars(env), session, FlowPath::default())
        .await
        .expect("handler should succeed")
}

fn single(value: Value) -> Command {
    normalize_flow_command(&raw(value)).expect("command should normalize")
}

#[test]
fn bare_string_becomes_text_command() {
    let flow = normalize_flow(&Param::from("Hello {{name}}")).expect("flow");
    assert_eq!(flow.len(), 1);
    match &flow.commands[0] {
        Command::Message(message) => {
            assert_eq!(message.kind, MessageKind::Text);
            assert_eq!(message.id, FlowId::from("text"));
            assert_eq!(message.text, Some(Param::from("Hello {{name}}")));
        }
        other => panic!("unexpected command {:?}", other),
    }
    assert_eq!(
        to_raw_param(&flow.commands[0]).to_value(),
        Some(json!({"type": "text", "id": "text", "text": "Hello {{name}}"}))
    );
}

#[test]
fn handler_passes_through_unchanged() {
    let handler = Handler::from_vars(|_| json!(1));
    let command = normalize_flow_command(&Param::Handler(handler.clone())).expect("command");
    assert_eq!(command, Command::Handler(handler));
}

#[test]
fn null_flow_is_empty_and_array_keeps_order() {
    assert!(normalize_flow(&Param::Null).expect("flow").is_empty());
    let flow = normalize_flow(&raw(json!(["a", {"set": {"x": 1}}, {"wait": 10}]))).expect("flow");
    let kinds = flow.commands.iter().map(Command::type_name).collect::<Vec<_>>();
    assert_eq!(kinds, vec!["text", "set", "wait"]);
}

#[test]
fn inference_follows_fixed_priority() {
    assert!(matches!(
        single(json!({"mediaUrl": "http://x/y.png", "text": "cap"})),
        Command::Message(ref message) if message.kind == MessageKind::Image
    ));
    assert!(matches!(single(json!({"finish": null})), Command::Finish(_)));
    assert!(matches!(single(json!({"finish": false, "start": "b"})), Command::Finish(_)));
    assert!(matches!(single(json!({"start": "other"})), Command::Start(_)));
    assert!(matches!(single(json!({"set": {"a": 1}, "if": true})), Command::Set(_)));
    assert!(matches!(single(json!({"when": true, "then": "x"})), Command::Conditional(_)));
    assert!(matches!(single(json!({"switch": "{{a}}", "cases": {}})), Command::Switch(_)));
    assert!(matches!(single(json!({"exec": "lookup"})), Command::Exec(_)));
    assert!(matches!(single(json!({"while": true, "do": "x"})), Command::Iteration(_)));
    assert!(matches!(single(json!({"break": true})), Command::Break(_)));
    assert!(matches!(single(json!({"continue": true})), Command::Continue(_)));
    assert!(matches!(single(json!({"id": "tail", "flow": ["x"]})), Command::SubFlow(_)));
}

#[test]
fn unrecognized_object_names_the_offender() {
    let error = normalize_flow_command(&raw(json!({"bogus": 1}))).expect_err("should fail");
    assert_eq!(error.code, "COMMAND_UNRECOGNIZED");
    assert!(error.message.contains("bogus"), "{}", error.message);

    let error = normalize_flow_command(&raw(json!(42))).expect_err("should fail");
    assert_eq!(error.code, "COMMAND_UNRECOGNIZED");
}

#[test]
fn explicit_flow_requires_id() {
    let error = normalize_flow_command(&raw(json!({"flow": ["x"]}))).expect_err("should fail");
    assert_eq!(error.code, "FLOW_ID_MISSING");
}

#[test]
fn invalid_command_id_is_rejected() {
    let error = normalize_flow_command(&raw(json!({"id": "a.b", "text": "x"}))).expect_err("id");
    assert_eq!(error.code, "FLOW_PATH_ID_INVALID");
}

#[test]
fn unless_swaps_branches() {
    match single(json!({"unless": "{{done}}", "then": "work", "else": "rest"})) {
        Command::Conditional(conditional) => {
            assert_eq!(conditional.test, Param::from("{{done}}"));
            assert_eq!(conditional.then, normalize_flow(&Param::from("rest")).expect("flow"));
            assert_eq!(
                conditional.otherwise,
                Some(normalize_flow(&Param::from("work")).expect("flow"))
            );
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn switch_mapping_becomes_ordered_cases() {
    match single(json!({"switch": "{{choice}}", "cases": {"b": "B", "a": ["A1", "A2"]}, "default": "D"})) {
        Command::Switch(switch) => {
            let ids = switch.cases.iter().map(|case| case.id.to_string()).collect::<Vec<_>>();
            assert_eq!(ids, vec!["b", "a"]);
            assert_eq!(switch.cases[1].flow.len(), 2);
            assert!(switch.default.is_some());
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn action_mapping_uses_key_as_id_and_text() {
    let command = single(json!({
        "text": "Pick one",
        "actions": {
            "Yes": "Great",
            "Site": {"uri": "http://example.com"},
            "Tell": {"type": "share"},
            "Pay": {"amount": 3, "text": "Buy now"}
        }
    }));
    let Command::Message(message) = command else {
        panic!("expected a message");
    };
    let Some(Actions::Static(actions)) = message.actions else {
        panic!("expected static actions");
    };
    assert_eq!(actions[0].id, FlowId::from("Yes"));
    assert_eq!(actions[0].action_type, ActionType::Reply);
    assert_eq!(actions[0].text, Some(Param::from("Yes")));
    assert!(actions[0].then.is_some());
    assert_eq!(actions[1].action_type, ActionType::Link);
    assert_eq!(actions[2].action_type, ActionType::Share);
    assert_eq!(actions[2].text, None);
    assert_eq!(actions[3].action_type, ActionType::Buy);
    assert_eq!(actions[3].text, Some(Param::from("Buy now")));
}

#[test]
fn item_actions_default_to_postback() {
    let command = single(json!({
        "type": "carousel",
        "items": {"Red": {"actions": {"Choose": "You chose red"}}}
    }));
    let Command::Message(message) = command else {
        panic!("expected a message");
    };
    let Some(Items::Static(items)) = message.items else {
        panic!("expected static items");
    };
    assert_eq!(items[0].id, FlowId::from("Red"));
    assert_eq!(items[0].text, Some(Param::from("Red")));
    let Some(Actions::Static(actions)) = &items[0].actions else {
        panic!("expected static item actions");
    };
    assert_eq!(actions[0].action_type, ActionType::Postback);
}

#[test]
fn then_on_link_action_is_rejected() {
    let error = normalize_flow_command(&raw(json!({
        "text": "x",
        "actions": [{"uri": "http://example.com", "then": "nope"}]
    })))
    .expect_err("should fail");
    assert_eq!(error.code, "ACTION_THEN_INVALID");
}

#[test]
fn dynamic_actions_stay_handlers() {
    let handler = Handler::from_vars(|_| json!([]));
    let command = normalize_flow_command(&Param::object([
        ("text", Param::from("x")),
        ("actions", Param::Handler(handler.clone())),
    ]))
    .expect("command");
    let Command::Message(message) = command else {
        panic!("expected a message");
    };
    assert_eq!(message.actions, Some(Actions::Dynamic(handler)));
    assert!(message.has_dynamic_parts());
}

#[test]
fn start_shapes() {
    let named = |value: Value| start_target(&raw(value)).expect("start target");
    assert_eq!(
        named(json!("Survey")),
        StartTarget::Named { dialog: "Survey".to_string(), args: None }
    );
    assert_eq!(
        named(json!(["Survey", {"topic": "x"}])),
        StartTarget::Named {
            dialog: "Survey".to_string(),
            args: Some(raw(json!({"topic": "x"})))
        }
    );
    assert_eq!(
        named(json!({"dialog": "Survey"})),
        StartTarget::Named { dialog: "Survey".to_string(), args: None }
    );
    assert!(matches!(named(json!("{{next}}")), StartTarget::Computed(_)));

    for bad in [json!(1), json!([]), json!(["a", 2]), json!({"args": {}}), json!("")] {
        let error = start_target(&raw(bad.clone())).expect_err("should fail");
        assert_eq!(error.code, "START_PARAM_INVALID", "{}", bad);
    }
}

#[test]
fn exec_accepts_name_and_tuple() {
    match single(json!({"exec": ["lookup", {"q": "{{text}}"}]})) {
        Command::Exec(exec) => {
            assert_eq!(exec.name, "lookup");
            assert_eq!(exec.args, Some(raw(json!({"q": "{{text}}"}))));
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[tokio::test]
async fn for_tuple_with_numeric_limit_and_step() {
    let Command::Iteration(iteration) = single(json!({"for": [{"i": 1}, 6, 2], "do": "Hello {{i}}"}))
    else {
        panic!("expected an iteration");
    };
    assert_eq!(iteration.id, FlowId::from("for"));
    assert_eq!(iteration.init, Some(raw(json!({"i": 1}))));
    assert_eq!(iteration.increment, Some(raw(json!({"i": 2}))));
    assert_eq!(call(&iteration.condition, json!({"i": 5})).await, Some(json!(true)));
    assert_eq!(call(&iteration.condition, json!({"i": 6})).await, Some(json!(false)));
}

#[test]
fn for_bare_identifier_starts_at_zero() {
    let Command::Iteration(iteration) = single(json!({"for": ["n", true, 1], "do": []})) else {
        panic!("expected an iteration");
    };
    assert_eq!(iteration.init, Some(raw(json!({"n": 0}))));
    assert_eq!(iteration.condition, Param::Bool(true));
    assert_eq!(iteration.increment, Some(raw(json!({"n": 1}))));

    let error = normalize_flow_command(&raw(json!({"for": [null, 3, 1]}))).expect_err("no names");
    assert_eq!(error.code, "ITERATION_INVALID");
}

#[tokio::test]
async fn until_inverts_while_including_handlers() {
    let Command::Iteration(literal) = single(json!({"until": false, "do": "x"})) else {
        panic!("expected an iteration");
    };
    assert_eq!(literal.condition, Param::Bool(true));

    let Command::Iteration(template) = single(json!({"until": "{{done}}", "do": "x"})) else {
        panic!("expected an iteration");
    };
    assert_eq!(call(&template.condition, json!({"done": true})).await, Some(json!(false)));
    assert_eq!(call(&template.condition, json!({})).await, Some(json!(true)));

    let done = Handler::new(|vars, _session, _path| async move {
        Ok(vars.get("done").cloned())
    });
    let command = normalize_flow_command(&Param::object([
        ("until", Param::Handler(done)),
        ("do", Param::from("x")),
    ]))
    .expect("command");
    let Command::Iteration(handler) = command else {
        panic!("expected an iteration");
    };
    assert_eq!(call(&handler.condition, json!({"done": 1})).await, Some(json!(false)));
    assert_eq!(call(&handler.condition, json!({"done": 0})).await, Some(json!(true)));
}

#[test]
fn normalizing_canonical_form_is_identity() {
    let handler = Handler::from_vars(|_| json!(true));
    let sources = vec![
        raw(json!("Hello")),
        raw(json!({"text": "Pick", "actions": {"A": "a", "B": {"thenFlow": "shared"}}, "quick": true})),
        raw(json!({"type": "list", "items": [{"text": "one", "actions": ["Go"]}]})),
        raw(json!({"if": "{{ok}}", "then": ["a"], "else": "b"})),
        raw(json!({"unless": "{{ok}}", "then": "a"})),
        raw(json!({"switch": "{{x}}", "cases": {"1": "one", "2": "two"}, "default": "d"})),
        raw(json!({"for": [{"i": 0}, 3, 1], "do": ["{{i}}", {"break": true}]})),
        raw(json!({"start": ["Child", {"a": 1}], "then": "back"})),
        raw(json!({"start": "Child"})),
        raw(json!({"finish": {"ok": true}})),
        raw(json!({"set": {"{a, b}": "{{pair}}"}})),
        raw(json!({"exec": ["lookup", {"q": 1}]})),
        raw(json!({"wait": 250})),
        raw(json!({"id": "tail", "flow": ["x", "y"]})),
        Param::object([("while", Param::Handler(handler.clone())), ("do", Param::from("x"))]),
        Param::Handler(handler),
    ];

    for source in sources {
        let once = normalize_flow(&source).expect("first normalization");
        let again = normalize_flow(&flow_to_raw(&once)).expect("second normalization");
        assert_eq!(once, again, "source {:?}", source);
    }
}
