use std::{
    io::{self, Write},
    sync::mpsc::{self, Receiver},
};

use anyhow::Result;

use crate::{
    broker::{health::HealthMonitor, session_manager::HealthCheck, transport::TransportFactory},
    domain::events::{AppEvent, ChatEvent},
    usecases::{
        context::AppContext,
        contracts::{AppEventSource, ChatApi},
        controller::{ChatController, ControllerError},
    },
};

use super::{
    event_source::{spawn_stdin_reader, ChannelEventSource},
    input::{parse_input, ShellCommand, HELP_LINES},
    render::{event_line, room_line, timeline_lines},
};

const SHELL_RECONNECT_FAILED: &str = "CHAT_SHELL_RECONNECT_FAILED";

/// Opens `room_id` and runs the interactive loop on stdin/stdout until the
/// user quits or input ends.
pub fn start(context: &mut AppContext, room_id: i64) -> Result<()> {
    tracing::info!(
        room_id,
        user_id = context.controller.viewer().user_id,
        "starting chat shell"
    );

    let (event_tx, event_rx) = mpsc::channel();
    let _health = HealthMonitor::start(context.health_interval(), event_tx.clone())?;
    spawn_stdin_reader(event_tx)?;

    let mut source = ChannelEventSource::new(event_rx);
    let mut stdout = io::stdout().lock();
    run(&mut context.controller, room_id, &mut source, &mut stdout)
}

pub fn run<A: ChatApi, F: TransportFactory>(
    controller: &mut ChatController<A, F>,
    room_id: i64,
    source: &mut dyn AppEventSource,
    out: &mut dyn Write,
) -> Result<()> {
    let events = controller.subscribe();
    open(controller, &events, room_id, out)?;

    loop {
        let Some(event) = source.next_event()? else {
            break;
        };

        match event {
            AppEvent::Tick => {
                controller.pump();
            }
            AppEvent::HealthCheck => {
                if let HealthCheck::Dropped { room_id } = controller.check_health() {
                    flush(&events, out)?;
                    writeln!(out, "connection to room {room_id} lost, reconnecting")?;
                    if let Err(error) = controller.reconnect() {
                        tracing::warn!(code = SHELL_RECONNECT_FAILED, room_id, error = %error, "reconnect failed");
                        writeln!(out, "! {error}")?;
                    }
                }
            }
            AppEvent::QuitRequested => break,
            AppEvent::InputLine(line) => {
                if !handle_command(controller, &events, parse_input(&line), out)? {
                    break;
                }
            }
        }

        flush(&events, out)?;
    }

    controller.shutdown();
    flush(&events, out)?;
    Ok(())
}

/// Returns `false` when the loop should stop.
fn handle_command<A: ChatApi, F: TransportFactory>(
    controller: &mut ChatController<A, F>,
    events: &Receiver<ChatEvent>,
    command: ShellCommand,
    out: &mut dyn Write,
) -> Result<bool> {
    let result = match command {
        ShellCommand::Empty => Ok(()),
        ShellCommand::Quit => return Ok(false),
        ShellCommand::Send(text) => controller.send(&text).map(|_| ()),
        ShellCommand::Older => {
            let outcome = controller.load_older();
            if matches!(outcome, Ok(ref page) if page.added > 0) {
                flush(events, out)?;
                print_timeline(controller, out)?;
            }
            outcome.map(|_| ())
        }
        ShellCommand::Rooms => controller.refresh_rooms().map(|_| print_rooms(controller, out)),
        ShellCommand::Open(room_id) => {
            open(controller, events, room_id, out)?;
            Ok(())
        }
        ShellCommand::Join(room_id) => controller.join_room(room_id).map(|room| {
            let _ = writeln!(out, "joined {}", room.name);
        }),
        ShellCommand::Performance(performance_id) => controller
            .room_for_performance(performance_id)
            .map(|room| {
                let unread = controller.unread(room.room_id);
                let _ = writeln!(out, "{}", room_line(&room, unread));
            }),
        ShellCommand::Edit(message_id, text) => controller.edit_message(message_id, &text),
        ShellCommand::Delete(message_id) => controller.delete_message(message_id),
        ShellCommand::Read => controller.mark_read(),
        ShellCommand::Reconnect => controller.reconnect(),
        ShellCommand::Status => {
            writeln!(
                out,
                "{} room={} unread={}",
                controller.status().as_label(),
                controller
                    .active_room()
                    .map_or_else(|| "-".to_owned(), |room_id| room_id.to_string()),
                controller.total_unread()
            )?;
            Ok(())
        }
        ShellCommand::Help => {
            for line in HELP_LINES {
                writeln!(out, "  {line}")?;
            }
            Ok(())
        }
        ShellCommand::Invalid(reason) => {
            writeln!(out, "? {reason}")?;
            Ok(())
        }
    };

    if let Err(error) = result {
        report(&error, out)?;
    }
    Ok(true)
}

fn open<A: ChatApi, F: TransportFactory>(
    controller: &mut ChatController<A, F>,
    events: &Receiver<ChatEvent>,
    room_id: i64,
    out: &mut dyn Write,
) -> Result<()> {
    let result = controller.open_room(room_id);
    flush_status_only(events, out)?;

    let name = controller
        .room(room_id)
        .map_or_else(|| format!("room {room_id}"), |room| room.name.clone());
    writeln!(out, "== {name} ==")?;
    print_timeline(controller, out)?;

    if let Err(error) = result {
        report(&error, out)?;
    }
    Ok(())
}

fn report(error: &ControllerError, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "! {error}")?;
    if let ControllerError::Send(send_error) = error {
        if !send_error.unsent.trim().is_empty() {
            writeln!(out, "  unsent: {}", send_error.unsent)?;
        }
    }
    Ok(())
}

fn print_timeline<A: ChatApi, F: TransportFactory>(
    controller: &ChatController<A, F>,
    out: &mut dyn Write,
) -> Result<()> {
    let Some(room_id) = controller.active_room() else {
        return Ok(());
    };
    if controller.has_more(room_id) {
        writeln!(out, "(/older for earlier messages)")?;
    }
    for line in timeline_lines(controller.messages(room_id)) {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

fn print_rooms<A: ChatApi, F: TransportFactory>(controller: &ChatController<A, F>, out: &mut dyn Write) {
    for room in controller.rooms() {
        let _ = writeln!(out, "{}", room_line(room, controller.unread(room.room_id)));
    }
}

fn flush(events: &Receiver<ChatEvent>, out: &mut dyn Write) -> Result<()> {
    for event in events.try_iter() {
        if let Some(line) = event_line(&event) {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Drains events after a full redraw; only connection changes are still news.
fn flush_status_only(events: &Receiver<ChatEvent>, out: &mut dyn Write) -> Result<()> {
    for event in events.try_iter() {
        if let ChatEvent::ConnectionChanged(_) = event {
            if let Some(line) = event_line(&event) {
                writeln!(out, "{line}")?;
            }
        }
    }
    Ok(())
}
