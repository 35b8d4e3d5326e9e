// Meeting CLI: headless participant and relay validation tool

use clap::{Parser, Subcommand};
use colored::*;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, BufReader};

use etutor_meet::config::{Config, IceConfig};
use etutor_meet::media::SyntheticCapture;
use etutor_meet::room::{ConnectionStatus, RoomConfig, RoomEvent, RoomSession, SessionState};
use etutor_meet::signal::ParticipantRole;

#[derive(Parser)]
#[command(name = "meet-cli")]
#[command(about = "Meeting room CLI client", long_about = None)]
struct Cli {
    /// Relay HTTP host:port (for health/config checks)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check relay health endpoint
    Health,

    /// Get relay configuration
    Config,

    /// Join a meeting as a participant
    Join {
        /// Meeting id to join
        #[arg(short, long)]
        meeting_id: String,

        /// Participant id (generated when omitted)
        #[arg(short, long)]
        participant_id: Option<String>,

        /// Role: tutor or student
        #[arg(short, long, default_value = "student")]
        role: String,

        /// Relay WebSocket URL (defaults to RELAY_URL)
        #[arg(long)]
        relay: Option<String>,

        /// Join without camera/microphone (receive-only)
        #[arg(long)]
        no_media: bool,
    },
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => check_health(&cli.server).await,
        Commands::Config => check_config(&cli.server).await,
        Commands::Join {
            meeting_id,
            participant_id,
            role,
            relay,
            no_media,
        } => {
            join_meeting(
                meeting_id,
                participant_id.as_deref(),
                role,
                relay.as_deref(),
                *no_media,
            )
            .await;
        }
    }
}

async fn check_health(server: &str) {
    println!("{}", "Checking relay health...".cyan());

    let url = format!("http://{}/meet/health", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                println!("{} Health check passed", "✓".green());

                if let Ok(body) = resp.json::<serde_json::Value>().await {
                    println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
                    println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
                    println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
                }
            } else {
                println!("{} Health check failed: {}", "✗".red(), status);
            }
        }
        Err(e) => {
            println!("{} Cannot connect to relay: {}", "✗".red(), e);
            println!("  Make sure the relay is running on {}", server);
        }
    }
}

async fn check_config(server: &str) {
    println!("{}", "Fetching relay configuration...".cyan());

    let url = format!("http://{}/meet/config", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => match resp.json::<serde_json::Value>().await {
            Ok(body) => {
                println!("{} Relay configuration:", "✓".green());
                println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
            }
            Err(e) => println!("{} Invalid config response: {}", "✗".red(), e),
        },
        Err(e) => println!("{} Cannot connect to relay: {}", "✗".red(), e),
    }
}

fn generate_participant_id() -> String {
    let mut rng = rand::thread_rng();
    format!("guest-{:06}", rng.gen_range(100000..999999))
}

async fn join_meeting(
    meeting_id: &str,
    participant_id: Option<&str>,
    role: &str,
    relay: Option<&str>,
    no_media: bool,
) {
    let participant_id = participant_id
        .map(str::to_string)
        .unwrap_or_else(generate_participant_id);

    let role = match role {
        "tutor" => ParticipantRole::Tutor,
        "student" => ParticipantRole::Student,
        other => {
            println!("{} Unknown role '{}', expected tutor or student", "✗".red(), other);
            return;
        }
    };

    let relay_url = relay
        .map(str::to_string)
        .unwrap_or_else(|| Config::from_env().relay.url);

    println!(
        "{} Joining meeting {} as {} ({:?})",
        "→".cyan(),
        meeting_id.bold(),
        participant_id.bold(),
        role
    );

    let config = RoomConfig {
        meeting_id: meeting_id.to_string(),
        participant_id: participant_id.clone(),
        role,
        relay_url,
        ice: IceConfig::from_env(),
    };

    let capture = if no_media {
        Box::new(SyntheticCapture::new(false, false))
    } else {
        Box::new(SyntheticCapture::default())
    };

    let (handle, mut events) = match RoomSession::join(config, capture) {
        Ok(session) => session,
        Err(e) => {
            println!("{} Cannot join: {}", "✗".red(), e);
            return;
        }
    };

    println!(
        "{}",
        "Type to chat, /cam toggles camera, /mic toggles mic, /quit leaves".dimmed()
    );

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        print_event(&participant_id, &event);
                        if matches!(event, RoomEvent::StateChanged(SessionState::Closed)) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            line = stdin.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        match line.trim() {
                            "" => {}
                            "/quit" => handle.leave(),
                            "/cam" => handle.toggle_camera(),
                            "/mic" => handle.toggle_mic(),
                            text => handle.send_chat(text),
                        }
                    }
                    Ok(None) | Err(_) => handle.leave(),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Leaving meeting...".yellow());
                handle.leave();
            }
        }
    }

    println!("{} Left meeting {}", "✓".green(), meeting_id);
}

fn print_event(local_id: &str, event: &RoomEvent) {
    match event {
        RoomEvent::StateChanged(state) => {
            println!("{} session {}", "•".cyan(), format!("{}", state).bold());
        }
        RoomEvent::StatusChanged(status) => {
            let line = match status {
                ConnectionStatus::Connecting => "connecting".yellow(),
                ConnectionStatus::Connected => "connected".green(),
                ConnectionStatus::Disconnected => "disconnected".red(),
            };
            println!("{} relay {}", "•".cyan(), line);
        }
        RoomEvent::MediaReady { video, audio } => {
            println!("{} media ready (video: {}, audio: {})", "•".cyan(), video, audio);
        }
        RoomEvent::MediaFailed { error } => {
            println!("{} no local media: {}", "!".yellow(), error);
        }
        RoomEvent::ParticipantJoined { participant_id } => {
            println!("{} {} joined", "+".green(), participant_id.bold());
        }
        RoomEvent::ParticipantLeft { participant_id } => {
            println!("{} {} left", "-".red(), participant_id.bold());
        }
        RoomEvent::TrackAdded {
            participant_id,
            kind,
            ..
        } => {
            println!("{} receiving {:?} from {}", "▶".green(), kind, participant_id.bold());
        }
        RoomEvent::LinkStatus {
            participant_id,
            state,
        } => {
            println!("{} link to {}: {:?}", "•".cyan(), participant_id, state);
        }
        RoomEvent::Chat(message) => {
            let who = if message.sender_id == local_id {
                "you".bold()
            } else {
                message.sender_id.bold()
            };
            println!("{} {}: {}", "💬".normal(), who, message.text);
        }
    }
}
