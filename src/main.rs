use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::*;

use chunkgate::world::WorldEvent;
use chunkgate::{ChunkPacket, Decision, DrainScheduler, Limiter, Network, RecipientId, Settings, World};

const BOTS: usize = 6;
const VIEW_DISTANCE: u8 = 8;
/// Every 30 seconds the longest-connected bot leaves and a new one joins.
const CHURN_PERIOD: Duration = Duration::from_secs(30);
const STATUS_PERIOD: Duration = Duration::from_secs(5);

/// Whole ticks in `period`, at least one.
fn ticks_in(period: Duration, tick: Duration) -> u32 {
    let ticks = period.as_nanos() / tick.as_nanos().max(1);
    ticks.clamp(1, u32::MAX as u128) as u32
}

enum Command {
    Reload,
    Status,
    Stop,
}

fn console() -> std::io::Result<mpsc::Receiver<Command>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new().name("console".into()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "" => continue,
                "reload" => Command::Reload,
                "status" => Command::Status,
                "stop" => Command::Stop,
                other => {
                    log::warn!("unknown command `{other}` (try reload, status or stop)");
                    continue;
                }
            };
            if tx.send(command).is_err() {
                break;
            }
        }
    })?;
    Ok(rx)
}

fn reload(path: &Path, limiter: &Limiter<ChunkPacket>) {
    match Settings::load(path) {
        Ok(settings) => limiter.reload(&settings),
        Err(e) => log::warn!("config not reloaded: {e}"),
    }
}

fn status(tick: u32, world: &World, network: &Network, limiter: &Limiter<ChunkPacket>) {
    let totals = network.totals();
    log::info!(
        "tick {tick}: {} players, {} packets ({}kb) sent, {} queued",
        world.players().count(),
        totals.packets,
        totals.bytes / 1024,
        limiter.total_queued()
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("chunkgate.json"));
    let settings = Settings::load(&config_path)?;
    log::info!("limiting to {} packets per tick per player", settings.max_packets);

    let limiter = Arc::new(Limiter::new(settings.clone()));
    let network = Arc::new(Network::new());
    let scheduler = {
        let network = network.clone();
        DrainScheduler::spawn(
            limiter.clone(),
            move |to: RecipientId, packet: ChunkPacket| network.transmit(to, &packet),
            settings.tick,
        )?
    };

    let mut route = |event: WorldEvent| match event {
        WorldEvent::Joined(_) => {}
        WorldEvent::Moved(id, pos) => limiter.on_recipient_moved(id, pos),
        WorldEvent::Packet(id, packet) => {
            if limiter.on_outbound_message(id, &packet) == Decision::Admit {
                if let Err(e) = network.transmit(id, &packet) {
                    log::warn!("{e}");
                }
            }
        }
        WorldEvent::Left(id) => {
            network.disconnect(id);
            limiter.on_recipient_gone(id);
        }
    };

    let mut world = World::new();
    let mut bots_joined = 0;
    let mut join = |world: &mut World, route: &mut dyn FnMut(WorldEvent)| {
        let name = format!("bot{bots_joined}");
        bots_joined += 1;
        let id = network.connect(name.as_str());
        world.login(id, &name, VIEW_DISTANCE, &mut |e| route(e));
    };
    for _ in 0..BOTS {
        join(&mut world, &mut route);
    }

    let churn_ticks = ticks_in(CHURN_PERIOD, settings.tick);
    let status_ticks = ticks_in(STATUS_PERIOD, settings.tick);
    let mut commands = Some(console()?);
    let starttime = Instant::now();
    loop {
        let next_tick_due = starttime + world.next_tick() * settings.tick;
        let wait = next_tick_due.saturating_duration_since(Instant::now());
        let received = match &commands {
            Some(rx) => rx.recv_timeout(wait),
            None => {
                std::thread::sleep(wait);
                Err(RecvTimeoutError::Timeout)
            }
        };
        match received {
            Ok(Command::Reload) => reload(&config_path, &limiter),
            Ok(Command::Status) => status(world.current_tick(), &world, &network, &limiter),
            Ok(Command::Stop) => break,
            Err(RecvTimeoutError::Disconnected) => {
                log::debug!("console closed");
                commands = None;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
        if Instant::now() < next_tick_due {
            continue;
        }

        let last_tick = world.current_tick();
        let time_passed_in_ticks = (Instant::now() - starttime).as_millis() / settings.tick.as_millis();
        world.tick_until(time_passed_in_ticks as u32, &mut route);

        let tick = world.current_tick();
        if tick / churn_ticks != last_tick / churn_ticks {
            let oldest = world.players().next().map(|(id, _)| id);
            if let Some(oldest) = oldest {
                world.logout(oldest, &mut route);
            }
            join(&mut world, &mut route);
        }
        if tick / status_ticks != last_tick / status_ticks {
            status(tick, &world, &network, &limiter);
        }
    }

    scheduler.stop();
    status(world.current_tick(), &world, &network, &limiter);
    Ok(())
}
