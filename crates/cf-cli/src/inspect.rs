use cf_core::FlowError;

use crate::{create_app_for_project, emit_inspect, load_project_by_dialogs_dir, InspectArgs};

pub(super) fn run_inspect(args: InspectArgs) -> Result<i32, FlowError> {
    let project = load_project_by_dialogs_dir(&args.dialogs_dir, args.entry)?;
    let app = create_app_for_project(&project)?;

    let mut lines = vec![format!("ENTRY:{}", app.entry())];
    for dialog in app.dialogs() {
        let registry = dialog.registry();
        lines.push(format!("DIALOG:{}", dialog.name()));
        lines.extend(registry.flow_keys().map(|key| format!("FLOW:{}", key)));
        lines.extend(
            registry
                .result_bindings()
                .map(|(child, tag, flow)| format!("RESULT_HANDLER:{}|{}|{}", child, tag, flow)),
        );
        lines.extend(
            registry
                .postback_keys()
                .filter_map(|key| registry.postback_handler(key).map(|flow| (key, flow)))
                .map(|(key, flow)| format!("POSTBACK:{}|{}", key, flow)),
        );
        lines.extend(
            registry
                .payload_keys()
                .filter_map(|key| registry.payload_handler(key).map(|flow| (key, flow)))
                .map(|(key, flow)| format!("PAYLOAD:{}|{}", key, flow)),
        );
    }
    emit_inspect(lines);
    Ok(0)
}
