use droidnet::NetEvent;

pub fn log_event(event: &NetEvent) {
    match event {
        NetEvent::PeerConnected { addr, username } => {
            log::info!("{username} joined from {addr}");
        }
        NetEvent::PeerDisconnected {
            addr,
            username,
            timed_out,
        } => {
            let reason = if *timed_out { "timed out" } else { "left" };
            log::info!("{username} ({addr}) {reason}");
        }
        NetEvent::PeerReady { addr } => log::info!("{addr} finished loading"),
        NetEvent::Registered { block } => {
            log::info!("joined, spawning with ids from {}", block.start);
        }
        NetEvent::ServerFull => log::warn!("server is full"),
        NetEvent::SetupReceived(setup) => log::info!(
            "match on {} (team {}, score limit {})",
            setup.map_name,
            setup.team_id,
            setup.score_limit
        ),
        NetEvent::ChatReceived(chat) => log::info!("<{}> {}", chat.username, chat.message),
        NetEvent::MatchEnded(result) => log::info!("match over, winner {:?}", result.winner),
        NetEvent::EntitySpawned { id, kind } => log::debug!("entity {id} spawned as {kind:?}"),
        NetEvent::EntityDeleted { id } => log::debug!("entity {id} deleted"),
        NetEvent::EntityKilled { id } => log::debug!("entity {id} killed"),
        NetEvent::Disconnected => log::info!("disconnected from host"),
    }
}
