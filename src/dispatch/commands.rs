//! # Built-in timer commands.
//!
//! The dispatch core contributes two commands to the external registry at
//! init and withdraws them at quit:
//!
//! - `TIMER time-ms command` (option `r` = recurring) — arms a timer that
//!   fires a `TEXT_INPUT` event carrying the command string, so the command
//!   surface re-executes it when the timer elapses.
//! - `DELTIMER timer-id` — removes a timer.
//!
//! Replies go out as `AGENT_SPEECH` events; rendering them is the output
//! devices' concern.

use std::sync::Arc;
use std::time::Duration;

use crate::command::{Command, CommandParams};
use crate::events::{Args, Topic};
use crate::runtime::Runtime;

use super::sync::HandlerSync;

pub(crate) const TIMER: &str = "TIMER";
pub(crate) const DELTIMER: &str = "DELTIMER";

/// Names of the commands the core registers, for unregistration at quit.
pub(crate) const BUILT_IN_NAMES: [&str; 2] = [TIMER, DELTIMER];

/// The commands the core registers at init.
pub(crate) fn built_ins() -> Vec<Command> {
    vec![
        Command::new(
            TIMER,
            "Schedules a command to execute in the future",
            "time-ms command",
            cmd_timer,
        )
        .with_options("r"),
        Command::new(DELTIMER, "Deletes a timer", "timer-id", cmd_deltimer),
    ]
}

fn say(rt: &Runtime, message: impl Into<String>) {
    rt.generate(Topic::AgentSpeech, Args::text(message));
}

async fn cmd_timer(rt: Runtime, params: CommandParams, _sync: Arc<HandlerSync>) {
    let recurring = params.has_option('r');
    if params.arg_count() < 2 {
        say(&rt, "A time in milliseconds and a command are required.");
        return;
    }
    let raw = params.arg(0).unwrap_or_default();
    let Ok(millis) = raw.parse::<u64>() else {
        say(&rt, format!("'{raw}' is not a number of milliseconds."));
        return;
    };

    let line = params.args()[1..].join(" ");
    let period = Duration::from_millis(millis);
    let id = if recurring {
        rt.add_timer(period, Topic::TextInput, Args::text(line))
    } else {
        rt.delay(period, Topic::TextInput, Args::text(line))
    };

    let kind = if recurring { "every" } else { "in" };
    say(&rt, format!("Okay, I will do that {kind} {millis}ms."));
    say(&rt, format!("The timer ID is {id}."));
}

async fn cmd_deltimer(rt: Runtime, params: CommandParams, _sync: Arc<HandlerSync>) {
    let Some(raw) = params.arg(0) else {
        say(&rt, "A timer ID to delete is required.");
        return;
    };
    let Ok(id) = raw.parse::<i16>() else {
        say(&rt, format!("'{raw}' is not a timer ID."));
        return;
    };
    match rt.remove_timer(id) {
        Ok(()) => say(&rt, format!("Okay, I stopped timer {id}.")),
        Err(e) => say(&rt, format!("I could not stop timer {id}: {e}.")),
    }
}
