#![forbid(unsafe_code)]

use std::env;
use std::io::{self, IsTerminal, Read};

use secrecy::SecretString;
use tonewell_engines::secret_vault::SecretVault;
use tonewell_tools::render::{execute_render_command, RenderSettings, RENDER_USAGE};
use tonewell_tools::vault_cli::{run_vault_command, VaultCommand, VAULT_USAGE};
use tracing_subscriber::EnvFilter;

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .try_init();
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let output = match args.first().map(String::as_str) {
        Some("vault") => run_vault(&args[1..])?,
        Some("render") => run_render(&args[1..])?,
        _ => return Err(format!("{VAULT_USAGE}\n{RENDER_USAGE}")),
    };
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn run_vault(args: &[String]) -> Result<String, String> {
    let command = VaultCommand::parse(args)?;
    let value = match command {
        VaultCommand::Set(id) => Some(read_secret_value(id.as_str())?),
        _ => None,
    };
    run_vault_command(&SecretVault::from_env(), command, value)
}

fn run_render(args: &[String]) -> Result<String, String> {
    let (category, duration) = match (args.first(), args.get(1)) {
        (Some(c), Some(d)) => (c.as_str(), d.as_str()),
        _ => return Err(RENDER_USAGE.to_string()),
    };
    let frequency = args.get(2).map(String::as_str);
    let settings = RenderSettings::from_env()?;
    execute_render_command(&settings.synthesizer(), category, duration, frequency)
}

/// Prompts without echo on a terminal, otherwise reads all of stdin.
fn read_secret_value(key_id: &str) -> Result<SecretString, String> {
    let raw = if io::stdin().is_terminal() {
        rpassword::prompt_password(format!("{key_id}: ")).map_err(|e| e.to_string())?
    } else {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| e.to_string())?;
        input
    };
    Ok(SecretString::from(raw.trim().to_string()))
}
