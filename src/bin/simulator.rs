use campusbus::agent::FleetAgent;
use campusbus::config::Config;
use campusbus::protocol::ResponseStatus;
use clap::{App, Arg};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = load_config()?;

    println!("🚌 Campus Bus Fleet Simulator");
    println!("=============================");
    println!("   Buses:       {}", config.simulation.bus_count);
    println!("   Tick period: {} ms", config.simulation.tick_period_ms);
    match config.simulation.seed {
        Some(seed) => println!("   Seed:        {}", seed),
        None => println!("   Seed:        (entropy)"),
    }

    let agent = Arc::new(Mutex::new(FleetAgent::new(config.simulation.clone())?));
    let mut fleet_watch = {
        let mut agent_guard = agent.lock().await;
        agent_guard.start().await
    };

    let (telemetry_tx, _) = broadcast::channel(config.server.broadcast_buffer);

    let listener = TcpListener::bind(config.server.bind_address()).await?;
    info!("🌐 TCP server listening on {}", config.server.bind_address());
    println!("📡 Ready for commands on {}", config.server.bind_address());

    let tcp_agent = Arc::clone(&agent);
    let tcp_telemetry_tx = telemetry_tx.clone();
    let tcp_server = tokio::spawn(async move {
        accept_clients(listener, tcp_agent, tcp_telemetry_tx).await;
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // Publish a frame for every snapshot the engine completes
    loop {
        tokio::select! {
            changed = fleet_watch.changed() => {
                if let Err(e) = changed {
                    error!("❌ Fleet watch closed: {}", e);
                    break;
                }

                let frame_json = {
                    let mut agent_guard = agent.lock().await;
                    let frame = agent_guard.next_frame();
                    agent_guard.serialize_frame(&frame)
                };

                match frame_json {
                    Ok(json) => {
                        // No subscribers is not an error
                        let _ = telemetry_tx.send(json);
                    }
                    Err(e) => warn!("Failed to serialize telemetry frame: {}", e),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    {
        let mut agent_guard = agent.lock().await;
        agent_guard.stop().await;
    }

    tcp_server.abort();
    println!("🛑 Campus Bus Fleet Simulator stopped");

    Ok(())
}

fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    let matches = App::new("campusbus-simulator")
        .version("0.1.0")
        .about("🚌 Campus bus fleet simulator server")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON config file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("TCP port to listen on")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("buses")
                .short("b")
                .long("buses")
                .value_name("COUNT")
                .help("Number of buses to simulate")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("tick-ms")
                .long("tick-ms")
                .value_name("MS")
                .help("Tick period in milliseconds")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .value_name("SEED")
                .help("Seed for a reproducible fleet")
                .takes_value(true),
        )
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(port) = matches.value_of("port") {
        config.server.port = port.parse()?;
    }
    if let Some(buses) = matches.value_of("buses") {
        config.simulation.bus_count = buses.parse()?;
    }
    if let Some(tick_ms) = matches.value_of("tick-ms") {
        config.simulation.tick_period_ms = tick_ms.parse()?;
    }
    if let Some(seed) = matches.value_of("seed") {
        config.simulation.seed = Some(seed.parse()?);
    }

    config.validate()?;
    Ok(config)
}

async fn accept_clients(listener: TcpListener, agent: Arc<Mutex<FleetAgent>>, telemetry_tx: broadcast::Sender<String>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("🔗 New client connected: {}", addr);
                let client_agent = Arc::clone(&agent);
                let client_telemetry_tx = telemetry_tx.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_agent, client_telemetry_tx).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("🔌 Client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    agent: Arc<Mutex<FleetAgent>>,
    telemetry_tx: broadcast::Sender<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let writer = Arc::new(Mutex::new(writer));
    let mut telemetry_task: Option<tokio::task::JoinHandle<()>> = None;

    let mut line = String::new();
    loop {
        line.clear();
        if buf_reader.read_line(&mut line).await? == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (response_json, subscribed) = {
            let mut agent_guard = agent.lock().await;
            let response = agent_guard.handle_line(trimmed).await;
            let subscribed = response.status == ResponseStatus::Subscribed;
            let json = agent_guard.protocol_handler().serialize_response(&response)?;
            (json, subscribed)
        };

        {
            let mut writer_guard = writer.lock().await;
            writer_guard.write_all(response_json.as_bytes()).await?;
            writer_guard.write_all(b"\n").await?;
        }
        debug!("📤 Sent response: {}", response_json);

        if subscribed && telemetry_task.is_none() {
            let mut telemetry_rx = telemetry_tx.subscribe();
            let telemetry_writer = Arc::clone(&writer);
            telemetry_task = Some(tokio::spawn(async move {
                loop {
                    let frame = match telemetry_rx.recv().await {
                        Ok(frame) => frame,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Telemetry subscriber lagged, skipped {} frames", skipped);
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };

                    let mut writer_guard = telemetry_writer.lock().await;
                    if let Err(e) = writer_guard.write_all(frame.as_bytes()).await {
                        warn!("Failed to send telemetry: {}", e);
                        break;
                    }
                    if let Err(e) = writer_guard.write_all(b"\n").await {
                        warn!("Failed to send telemetry newline: {}", e);
                        break;
                    }
                }
            }));
        }
    }

    if let Some(task) = telemetry_task {
        task.abort();
    }
    Ok(())
}
