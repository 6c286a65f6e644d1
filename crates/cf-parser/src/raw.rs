use cf_core::{
    Action, Actions, Command, Flow, FlowId, Item, Items, Param, ParamMap, StartTarget,
};

/// Canonical raw form of a flow: an array of canonical commands.
pub fn flow_to_raw(flow: &Flow) -> Param {
    Param::array(flow.commands.iter().map(to_raw_param))
}

/// Canonical raw form of a command. Every object carries `type` and `id`, so
/// normalizing the result yields the same command again.
pub fn to_raw_param(command: &Command) -> Param {
    let mut raw = ParamMap::new();
    if let Some(id) = command.id() {
        raw.insert("type", Param::from(command.type_name()));
        raw.insert("id", id_param(id));
    }

    match command {
        Command::Handler(handler) => return Param::Handler(handler.clone()),
        Command::Message(message) => {
            put(&mut raw, "text", message.text.clone());
            put(&mut raw, "mediaUrl", message.media_url.clone());
            put(&mut raw, "actions", message.actions.as_ref().map(actions_to_raw));
            put(&mut raw, "items", message.items.as_ref().map(items_to_raw));
            extend(&mut raw, &message.extra);
        }
        Command::Conditional(conditional) => {
            raw.insert("if", conditional.test.clone());
            raw.insert("then", flow_to_raw(&conditional.then));
            put(&mut raw, "else", conditional.otherwise.as_ref().map(flow_to_raw));
        }
        Command::Switch(switch) => {
            raw.insert("switch", switch.value.clone());
            raw.insert(
                "cases",
                Param::array(switch.cases.iter().map(|case| {
                    Param::object([("id", id_param(&case.id)), ("do", flow_to_raw(&case.flow))])
                })),
            );
            put(&mut raw, "default", switch.default.as_ref().map(flow_to_raw));
        }
        Command::Iteration(iteration) => {
            put(&mut raw, "init", iteration.init.clone());
            raw.insert("condition", iteration.condition.clone());
            put(&mut raw, "increment", iteration.increment.clone());
            raw.insert("do", flow_to_raw(&iteration.body));
        }
        Command::Start(start) => {
            let target = match &start.target {
                StartTarget::Named { dialog, args: None } => Param::from(dialog.as_str()),
                StartTarget::Named {
                    dialog,
                    args: Some(args),
                } => Param::array([Param::from(dialog.as_str()), args.clone()]),
                StartTarget::Computed(param) => param.clone(),
            };
            raw.insert("start", target);
            put(&mut raw, "then", start.then.as_ref().map(flow_to_raw));
        }
        Command::Finish(finish) => raw.insert("finish", finish.result.clone()),
        Command::Set(set) => raw.insert("set", set.values.clone()),
        Command::Exec(exec) => {
            let target = match &exec.args {
                Some(args) => Param::array([Param::from(exec.name.as_str()), args.clone()]),
                None => Param::from(exec.name.as_str()),
            };
            raw.insert("exec", target);
        }
        Command::Wait(wait) => raw.insert("wait", wait.delay.clone()),
        Command::Break(_) => raw.insert("break", Param::Bool(true)),
        Command::Continue(_) => raw.insert("continue", Param::Bool(true)),
        Command::SubFlow(sub_flow) => raw.insert("flow", flow_to_raw(&sub_flow.flow)),
    }
    Param::Object(raw)
}

fn actions_to_raw(actions: &Actions) -> Param {
    match actions {
        Actions::Dynamic(handler) => Param::Handler(handler.clone()),
        Actions::Static(actions) => Param::array(actions.iter().map(action_to_raw)),
    }
}

fn action_to_raw(action: &Action) -> Param {
    let mut raw = ParamMap::new();
    raw.insert("type", Param::from(action.action_type.as_str()));
    raw.insert("id", id_param(&action.id));
    put(&mut raw, "text", action.text.clone());
    put(&mut raw, "then", action.then.as_ref().map(flow_to_raw));
    put(&mut raw, "thenFlow", action.then_flow.as_deref().map(Param::from));
    extend(&mut raw, &action.extra);
    Param::Object(raw)
}

fn items_to_raw(items: &Items) -> Param {
    match items {
        Items::Dynamic(handler) => Param::Handler(handler.clone()),
        Items::Static(items) => Param::array(items.iter().map(item_to_raw)),
    }
}

fn item_to_raw(item: &Item) -> Param {
    let mut raw = ParamMap::new();
    raw.insert("id", id_param(&item.id));
    put(&mut raw, "text", item.text.clone());
    put(&mut raw, "actions", item.actions.as_ref().map(actions_to_raw));
    extend(&mut raw, &item.extra);
    Param::Object(raw)
}

fn id_param(id: &FlowId) -> Param {
    match id {
        FlowId::Index(index) => Param::from(*index as i64),
        FlowId::Name(name) => Param::from(name.as_str()),
    }
}

fn put(raw: &mut ParamMap, key: &str, value: Option<Param>) {
    if let Some(value) = value {
        raw.insert(key, value);
    }
}

fn extend(raw: &mut ParamMap, extra: &ParamMap) {
    for (key, value) in extra.iter() {
        raw.insert(key.clone(), value.clone());
    }
}
