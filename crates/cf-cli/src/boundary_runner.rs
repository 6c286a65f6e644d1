use cf_api::FlowTurn;

use crate::{BoundaryEvent, BoundaryResult};

pub(crate) fn boundary_from_turn(turn: &FlowTurn) -> BoundaryResult {
    BoundaryResult {
        event: if turn.ended {
            BoundaryEvent::End
        } else {
            BoundaryEvent::Waiting
        },
        messages: turn.messages.clone(),
    }
}

pub(crate) fn emit_boundary(boundary: BoundaryResult, state_out: Option<String>) {
    println!("RESULT:OK");
    match boundary.event {
        BoundaryEvent::Waiting => println!("EVENT:WAITING"),
        BoundaryEvent::End => println!("EVENT:END"),
    }

    for message in boundary.messages {
        println!("MESSAGE_JSON:{}", message);
    }

    println!(
        "STATE_OUT:{}",
        state_out.unwrap_or_else(|| "NONE".to_string())
    );
}

/// Protocol lines for `inspect`: one per flow and routing entry.
pub(crate) fn emit_inspect(lines: Vec<String>) {
    println!("RESULT:OK");
    for line in lines {
        println!("{}", line);
    }
}

#[cfg(test)]
mod boundary_runner_tests {
    use super::*;
    use crate::error_map::json_line;
    use cf_core::SessionSnapshot;
    use serde_json::json;

    #[test]
    fn boundary_event_follows_turn_end() {
        let mut turn = FlowTurn {
            messages: vec![json!({"type": "text", "text": "Hi"})],
            snapshot: SessionSnapshot::new("s1", "main"),
            ended: false,
        };
        let boundary = boundary_from_turn(&turn);
        assert_eq!(boundary.event, BoundaryEvent::Waiting);
        assert_eq!(boundary.messages.len(), 1);

        turn.ended = true;
        assert_eq!(boundary_from_turn(&turn).event, BoundaryEvent::End);
    }

    #[test]
    fn json_line_matches_message_encoding() {
        assert_eq!(json_line("Hi"), json!("Hi").to_string());
    }
}
