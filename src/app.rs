use anyhow::Result;

use crate::{
    broker::{self, transport::TransportFactory},
    cli::{Cli, Command},
    domain, infra, ui,
    usecases::{self, bootstrap, contracts::ChatApi, controller::ChatController},
};

pub fn run(cli: Cli) -> Result<()> {
    tracing::debug!(
        ui = ui::module_name(),
        domain = domain::module_name(),
        broker = broker::module_name(),
        usecases = usecases::module_name(),
        infra = infra::module_name(),
        "module boundaries loaded"
    );

    let command = cli.command_or_default();
    let mut context = bootstrap::bootstrap(cli.config.as_deref())?;

    match command {
        Command::Rooms => {
            for line in room_listing(&mut context.controller)? {
                println!("{line}");
            }
        }
        Command::Open { room_id } => ui::shell::start(&mut context, room_id)?,
        Command::Show { performance_id } => {
            let room = context.controller.room_for_performance(performance_id)?;
            println!("{}", ui::room_line(&room, context.controller.unread(room.room_id)));
        }
    }

    Ok(())
}

fn room_listing<A: ChatApi, F: TransportFactory>(
    controller: &mut ChatController<A, F>,
) -> Result<Vec<String>> {
    controller.refresh_rooms()?;

    let rooms = controller.rooms();
    if rooms.is_empty() {
        return Ok(vec!["You have not joined any chat rooms.".to_owned()]);
    }

    let mut lines: Vec<String> = rooms
        .into_iter()
        .map(|room| ui::room_line(room, controller.unread(room.room_id)))
        .collect();
    lines.push(format!("{} unread in total", controller.total_unread()));
    Ok(lines)
}
