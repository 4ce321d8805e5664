use campusbus::engine::FleetSnapshot;
use campusbus::fleet::{BusRecord, BusStatus};
use campusbus::protocol::{CommandType, ProtocolHandler};
use campusbus::telemetry::{FleetSummary, StopArrival, TelemetryFrame};
use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use std::process::Command;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult {
    let matches = App::new("campusbus")
        .version("0.1.0")
        .author("Campus Transit Engineering Team")
        .about("🚌 Campus Bus - live fleet simulator client")
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Simulator port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output")
                .global(true),
        )
        .subcommand(SubCommand::with_name("ping").about("🏓 Test connection to the fleet simulator"))
        .subcommand(
            SubCommand::with_name("status")
                .about("📊 Fleet summary")
                .long_about("Shows how many buses are active, idle and in maintenance, with the average ETA"),
        )
        .subcommand(SubCommand::with_name("fleet").about("🚌 List every bus in the fleet"))
        .subcommand(
            SubCommand::with_name("bus")
                .about("🔎 Show one bus")
                .arg(Arg::with_name("id").help("Bus identifier, e.g. bus-3").required(true)),
        )
        .subcommand(
            SubCommand::with_name("arrivals")
                .about("🚏 Buses heading to a stop, soonest first")
                .arg(Arg::with_name("stop").help("Stop name, e.g. \"Main Gate\"").required(true)),
        )
        .subcommand(
            SubCommand::with_name("set-status")
                .about("🛠️  Override a bus status")
                .arg(Arg::with_name("id").help("Bus identifier").required(true))
                .arg(
                    Arg::with_name("status")
                        .help("New status")
                        .required(true)
                        .possible_values(&["active", "idle", "maintenance"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("restart")
                .about("🔄 Restart the simulation with a new fleet")
                .arg(
                    Arg::with_name("count")
                        .help("Number of buses")
                        .required(true)
                        .validator(|v| match v.parse::<usize>() {
                            Ok(count) if count > 0 => Ok(()),
                            _ => Err("Bus count must be a positive number".into()),
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("📈 Monitor live fleet telemetry")
                .arg(
                    Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Monitor duration in seconds (default: until interrupted)")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("server")
                .about("🚀 Start the fleet simulator server")
                .arg(
                    Arg::with_name("background")
                        .short("b")
                        .long("background")
                        .help("Run server in background"),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let format = matches.value_of("format").unwrap_or("table");
    let verbose = matches.is_present("verbose");

    if verbose {
        println!("{}", "🚌 Campus Bus Fleet Client".bright_blue().bold());
        println!("{} {}:{}", "Connecting to".dimmed(), host, port);
    }

    let client = Client { host, port, format };

    match matches.subcommand() {
        ("ping", _) => client.ping().await?,
        ("status", _) => client.status().await?,
        ("fleet", _) => client.fleet().await?,
        ("bus", Some(sub)) => client.bus(required(sub, "id")?).await?,
        ("arrivals", Some(sub)) => client.arrivals(required(sub, "stop")?).await?,
        ("set-status", Some(sub)) => {
            let status = required(sub, "status")?.parse::<BusStatus>()?;
            client.set_status(required(sub, "id")?, status).await?;
        }
        ("restart", Some(sub)) => {
            let count = required(sub, "count")?.parse::<usize>()?;
            client.restart(count).await?;
        }
        ("monitor", Some(sub)) => {
            let duration = sub.value_of("duration").map(str::parse::<u64>).transpose()?;
            client.monitor(duration.map(Duration::from_secs)).await?;
        }
        ("server", Some(sub)) => handle_server(sub, port)?,
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Start the simulator server", "campusbus server".bright_cyan());
            println!("  {} Show the fleet", "campusbus fleet".bright_cyan());
            println!("  {} Watch buses move", "campusbus monitor".bright_cyan());
        }
    }

    Ok(())
}

fn required<'a>(matches: &'a ArgMatches<'_>, name: &str) -> CliResult<&'a str> {
    matches
        .value_of(name)
        .ok_or_else(|| format!("missing argument <{}>", name).into())
}

struct Client<'a> {
    host: &'a str,
    port: u16,
    format: &'a str,
}

impl Client<'_> {
    async fn ping(&self) -> CliResult {
        let response = self.send(CommandType::Ping).await?;
        match self.format {
            "json" => println!("{}", response),
            _ => {
                if response_status(&response) == "Success" {
                    println!("{} {}", "✅".green(), "Fleet simulator is responsive".bright_green());
                } else {
                    println!("{} {}", "❌".red(), "Ping failed".bright_red());
                }
            }
        }
        Ok(())
    }

    async fn status(&self) -> CliResult {
        let response = self.send(CommandType::FleetStatus).await?;
        if self.format == "json" {
            println!("{}", response);
            return Ok(());
        }

        let summary: FleetSummary = payload(&response)?;
        match self.format {
            "compact" => println!(
                "{} total | {} active | {} idle | {} maintenance",
                summary.total, summary.active, summary.idle, summary.maintenance
            ),
            _ => print_summary(&summary),
        }
        Ok(())
    }

    async fn fleet(&self) -> CliResult {
        let response = self.send(CommandType::GetFleet).await?;
        if self.format == "json" {
            println!("{}", response);
            return Ok(());
        }

        let snapshot: FleetSnapshot = payload(&response)?;
        match self.format {
            "compact" => {
                for bus in &snapshot.buses {
                    println!("{} {} {} {}min", bus.bus_number, bus.route, bus.status, bus.eta);
                }
            }
            _ => {
                println!(
                    "{} {}",
                    "🚌 Fleet".bright_blue().bold(),
                    format!("(run {}, tick {})", snapshot.generation, snapshot.tick).dimmed()
                );
                print_bus_table(&snapshot.buses);
            }
        }
        Ok(())
    }

    async fn bus(&self, bus_id: &str) -> CliResult {
        let response = self
            .send(CommandType::GetBus {
                bus_id: bus_id.to_string(),
            })
            .await?;
        if self.format == "json" {
            println!("{}", response);
            return Ok(());
        }
        if response_status(&response) == "NotFound" {
            println!("{} No bus named {}", "❌".red(), bus_id.bright_white());
            return Ok(());
        }

        let bus: BusRecord = payload(&response)?;
        match self.format {
            "compact" => println!("{} {} {} {}min", bus.bus_number, bus.route, bus.status, bus.eta),
            _ => print_bus_detail(&bus),
        }
        Ok(())
    }

    async fn arrivals(&self, stop: &str) -> CliResult {
        let response = self
            .send(CommandType::StopArrivals { stop: stop.to_string() })
            .await?;
        if self.format == "json" {
            println!("{}", response);
            return Ok(());
        }

        let arrivals: Vec<StopArrival> = payload(&response)?;
        if arrivals.is_empty() {
            println!("{} No buses serve {}", "🚏".yellow(), stop.bright_white());
            return Ok(());
        }

        println!("{} {}", "🚏 Arrivals at".bright_blue().bold(), stop.bright_white().bold());
        for arrival in arrivals {
            let eta = format!("{:>3} min", arrival.eta);
            let eta = if arrival.status == BusStatus::Active { eta.bright_green() } else { eta.dimmed() };
            println!(
                "  {} {:<8} {} {:>4.1} km  {} stop(s) away",
                arrival.bus_number.bright_white(),
                arrival.route,
                eta,
                arrival.distance,
                arrival.stops_away
            );
        }
        Ok(())
    }

    async fn set_status(&self, bus_id: &str, status: BusStatus) -> CliResult {
        let response = self
            .send(CommandType::SetBusStatus {
                bus_id: bus_id.to_string(),
                status,
            })
            .await?;
        print_command_result("Bus status", &format!("{} -> {}", bus_id, status), &response, self.format);
        Ok(())
    }

    async fn restart(&self, bus_count: usize) -> CliResult {
        let response = self.send(CommandType::Restart { bus_count }).await?;
        print_command_result("Fleet", &format!("{} buses", bus_count), &response, self.format);
        Ok(())
    }

    async fn monitor(&self, duration: Option<Duration>) -> CliResult {
        println!("{}", "📡 Monitoring fleet telemetry (Press Ctrl+C to stop)...".bright_blue().bold());

        let stream = self.connect().await?;
        let (reader, mut writer) = stream.into_split();

        let subscribe = ProtocolHandler::new().build_command(CommandType::Subscribe);
        writer.write_all(serde_json::to_string(&subscribe)?.as_bytes()).await?;
        writer.write_all(b"\n").await?;

        if let Err(e) = watch_frames(reader, self.format, duration).await {
            eprintln!("{} Telemetry stream failed: {}", "🔌".yellow(), e.to_string().bright_red());
            return Err(e.into());
        }
        Ok(())
    }

    async fn connect(&self) -> CliResult<TcpStream> {
        let addr = format!("{}:{}", self.host, self.port);
        match TcpStream::connect(&addr).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                eprintln!("{} Failed to connect to fleet simulator at {}", "❌".red(), addr.bright_white());
                if e.kind() == std::io::ErrorKind::ConnectionRefused {
                    eprintln!("{} Server is not running. Start it with:", "💡".yellow());
                    eprintln!("   {}", "campusbus server".bright_cyan());
                    eprintln!("   or");
                    eprintln!("   {}", "cargo run --bin campusbus-simulator".bright_cyan());
                } else {
                    eprintln!("{} Network error: {}", "🔌".yellow(), e.to_string().bright_red());
                }
                Err(e.into())
            }
        }
    }

    async fn send(&self, command_type: CommandType) -> CliResult<String> {
        let command = serde_json::to_string(&ProtocolHandler::new().build_command(command_type))?;
        let stream = self.connect().await?;
        let (reader, writer) = stream.into_split();

        match tokio::time::timeout(COMMAND_TIMEOUT, exchange(reader, writer, &command)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                eprintln!("{} Command timed out after {} seconds", "⏰".yellow(), COMMAND_TIMEOUT.as_secs());
                eprintln!("{} Server may be overloaded or unresponsive", "💡".yellow());
                Err("Command timeout".into())
            }
        }
    }
}

async fn exchange(reader: OwnedReadHalf, mut writer: OwnedWriteHalf, command: &str) -> std::io::Result<String> {
    writer.write_all(command.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    let mut line = String::new();
    if BufReader::new(reader).read_line(&mut line).await? == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "Server closed connection",
        ));
    }
    Ok(line.trim_end().to_string())
}

/// Print frames until the stream ends or `duration` elapses. Read errors are
/// returned; running out the clock is not an error.
async fn watch_frames<R>(reader: R, format: &str, duration: Option<Duration>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    match duration {
        Some(limit) => match tokio::time::timeout(limit, stream_frames(reader, format)).await {
            Ok(result) => result,
            Err(_) => {
                println!("{}", "⏹️  Monitor duration elapsed".dimmed());
                Ok(())
            }
        },
        None => stream_frames(reader, format).await,
    }
}

async fn stream_frames<R>(reader: R, format: &str) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        // The subscribe acknowledgement precedes the frames
        let frame = match serde_json::from_str::<TelemetryFrame>(&line) {
            Ok(frame) => frame,
            Err(_) => continue,
        };

        match format {
            "json" => println!("{}", line),
            "compact" => println!(
                "[#{} tick {}] {} active | {} idle | {} maintenance",
                frame.sequence, frame.tick, frame.summary.active, frame.summary.idle, frame.summary.maintenance
            ),
            _ => print_frame(&frame),
        }
    }
    Ok(())
}

fn handle_server(matches: &ArgMatches<'_>, port: u16) -> CliResult {
    let background = matches.is_present("background");
    println!("{}", "🚀 Starting campus bus fleet simulator...".bright_green().bold());

    let port_arg = port.to_string();
    let mut cmd = Command::new("cargo");
    cmd.args(["run", "--bin", "campusbus-simulator", "--", "--port", port_arg.as_str()]);

    if background {
        cmd.spawn()?;
        println!("{} Server started in background on port {}", "✅".green(), port);
    } else {
        println!("{} Server starting on port {} (Press Ctrl+C to stop)", "🌐".bright_blue(), port);
        cmd.status()?;
    }
    Ok(())
}

fn response_status(response: &str) -> String {
    serde_json::from_str::<serde_json::Value>(response)
        .ok()
        .and_then(|parsed| parsed["status"].as_str().map(ToString::to_string))
        .unwrap_or_else(|| "Unknown".to_string())
}

fn payload<T: serde::de::DeserializeOwned>(response: &str) -> CliResult<T> {
    let mut parsed: serde_json::Value = serde_json::from_str(response)?;
    let status = parsed["status"].as_str().unwrap_or("Unknown").to_string();
    if status != "Success" {
        let message = parsed["message"].as_str().unwrap_or("no details").to_string();
        return Err(format!("{}: {}", status, message).into());
    }
    Ok(serde_json::from_value(parsed["payload"].take())?)
}

fn status_label(status: BusStatus) -> ColoredString {
    match status {
        BusStatus::Active => "ACTIVE".bright_green(),
        BusStatus::Idle => "IDLE".dimmed(),
        BusStatus::Maintenance => "MAINT".bright_red(),
    }
}

fn print_summary(summary: &FleetSummary) {
    println!("{}", "📊 Fleet Status".bright_blue().bold());
    println!("{}", "═══════════════".bright_blue());
    println!("{} {}", "Total buses:".bright_white(), summary.total);
    println!("{} {}", "Active:".bright_white(), summary.active.to_string().bright_green());
    println!("{} {}", "Idle:".bright_white(), summary.idle.to_string().dimmed());
    println!("{} {}", "Maintenance:".bright_white(), summary.maintenance.to_string().bright_red());
    match summary.average_eta_min {
        Some(eta) => println!("{} {:.1} min", "Average ETA:".bright_white(), eta),
        None => println!("{} {}", "Average ETA:".bright_white(), "n/a".dimmed()),
    }
    for load in &summary.active_by_route {
        println!("  {} {} active", load.route.bright_cyan(), load.active);
    }
}

fn print_bus_table(buses: &[BusRecord]) {
    println!("{}", "┌─────────┬─────────┬────────┬─────────┬──────────┬────────────────────┐".bright_white());
    println!("{}", "│ Bus     │ Route   │ Status │ ETA     │ Distance │ Current Stop       │".bright_white());
    println!("{}", "├─────────┼─────────┼────────┼─────────┼──────────┼────────────────────┤".bright_white());
    for bus in buses {
        println!(
            "│ {:<7} │ {:<7} │ {:<6} │ {:>3} min │ {:>5.1} km │ {:<18} │",
            bus.bus_number,
            bus.route,
            status_label(bus.status),
            bus.eta,
            bus.distance,
            bus.current_stop().unwrap_or("-")
        );
    }
    println!("{}", "└─────────┴─────────┴────────┴─────────┴──────────┴────────────────────┘".bright_white());
}

fn print_bus_detail(bus: &BusRecord) {
    println!("{} {}", "🚌".bright_blue(), bus.bus_number.bright_blue().bold());
    println!("{} {}", "Id:".bright_white(), bus.id);
    println!("{} {}", "Route:".bright_white(), bus.route.bright_cyan());
    println!("{} {}", "Status:".bright_white(), status_label(bus.status));
    println!("{} {:.5}, {:.5}", "Position:".bright_white(), bus.latitude, bus.longitude);
    println!("{} {} min ({:.1} km)", "ETA:".bright_white(), bus.eta, bus.distance);
    match (bus.current_stop(), bus.next_stop()) {
        (Some(current), Some(next)) => println!("{} {} -> {}", "Stop:".bright_white(), current.bright_green(), next),
        _ => println!("{} {}", "Stop:".bright_white(), "unknown".dimmed()),
    }
    let route: Vec<String> = bus
        .stops
        .iter()
        .enumerate()
        .map(|(index, stop)| {
            if index == bus.current_stop_index {
                format!("[{}]", stop)
            } else {
                stop.clone()
            }
        })
        .collect();
    println!("{} {}", "Route stops:".bright_white(), route.join(" → ").dimmed());
}

fn print_frame(frame: &TelemetryFrame) {
    println!(
        "{} {}",
        format!("── frame #{} · run {} · tick {} ──", frame.sequence, frame.generation, frame.tick).bright_white(),
        match frame.summary.average_eta_min {
            Some(eta) => format!("avg ETA {:.1} min", eta).bright_cyan(),
            None => "no active buses".dimmed(),
        }
    );
    for marker in &frame.markers {
        println!("  {} {}", status_label(marker.status), marker.overlay_text());
    }
}

fn print_command_result(action: &str, value: &str, response: &str, format: &str) {
    match format {
        "json" => println!("{}", response),
        "compact" => println!("{}", response_status(response)),
        _ => {
            let parsed = serde_json::from_str::<serde_json::Value>(response).unwrap_or_default();
            let message = parsed["message"].as_str().unwrap_or("").to_string();
            match response_status(response).as_str() {
                "Success" => println!("{} {} set to {}", "✅".green(), action.bright_white(), value.bright_cyan()),
                "NotFound" => println!("{} {} failed: {}", "❌".red(), action.bright_white(), message.bright_red()),
                "InvalidCommand" => {
                    println!("{} {} rejected: {}", "❌".red(), action.bright_white(), message.bright_red());
                }
                other => println!("{} {} status {}: {}", "❓".blue(), action.bright_white(), other.bright_blue(), message),
            }
        }
    }
}
