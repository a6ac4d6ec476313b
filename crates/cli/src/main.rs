//! hidpp-codec CLI: encode and decode HID++ 2.0 frames from the command line.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use hidpp_codec_core::hidpp::Envelope;
use hidpp_codec_core::{
    decode_message, encode_message, find_schema, models, Container, DecodeOptions, Schema, Value,
};

#[derive(Parser)]
#[command(
    name = "hidpp-codec",
    version,
    about = "Encode and decode Logitech HID++ 2.0 messages"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every known message layout.
    List,
    /// Decode a frame with a message layout.
    Decode {
        /// Message name, e.g. GetInfoResponse (case-insensitive).
        message: String,
        /// Frame bytes in hex; spaces, ':' and '-' are ignored.
        hex: String,
        /// Print JSON instead of a summary.
        #[arg(long)]
        json: bool,
        /// Fill truncated fields instead of failing.
        #[arg(long)]
        lenient: bool,
    },
    /// Build a message from field assignments and print the frame.
    Encode {
        /// Message name, e.g. GetInfo (case-insensitive).
        message: String,
        /// Field values as NAME=VALUE: decimal, 0x-prefixed hex, or #-prefixed hex bytes.
        assignments: Vec<String>,
        /// Also print the message summary.
        #[arg(long)]
        summary: bool,
    },
}

fn lookup(name: &str) -> Result<&'static Schema> {
    find_schema(name).ok_or_else(|| anyhow!("Unknown message '{name}'. Run `hidpp-codec list`."))
}

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits in '{text}'");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

fn parse_value(text: &str) -> Result<Value> {
    if let Some(bytes) = text.strip_prefix('#') {
        return parse_hex(bytes).map(Value::Bytes);
    }
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed
        .map(Value::Int)
        .with_context(|| format!("invalid value '{text}'"))
}

fn parse_assignment(text: &str) -> Result<(String, Value)> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{text}'"))?;
    Ok((name.trim().to_string(), parse_value(value.trim())?))
}

fn describe(envelope: &Envelope) -> String {
    format!(
        "{:?}, {}, index {}",
        envelope.kind, envelope.report, envelope.function_index
    )
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            for model in models() {
                println!(
                    "{} (0x{:04X}, version {})",
                    model.name(),
                    model.id(),
                    model.version()
                );
                for schema in model.schemas() {
                    match schema.envelope() {
                        Some(envelope) => println!("  {}: {}", schema.name(), describe(envelope)),
                        None => println!("  {}", schema.name()),
                    }
                }
            }
        }
        Commands::Decode {
            message,
            hex,
            json,
            lenient,
        } => {
            let schema = lookup(&message)?;
            let frame = parse_hex(&hex)?;
            let options = if lenient {
                DecodeOptions::lenient()
            } else {
                DecodeOptions::default()
            };
            let decoded = decode_message(schema, &frame, options)
                .with_context(|| format!("decode {}", schema.name()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&decoded.to_json())?);
            } else {
                print!("{}", decoded.summary());
            }
        }
        Commands::Encode {
            message,
            assignments,
            summary,
        } => {
            let schema = lookup(&message)?;
            let values = assignments
                .iter()
                .map(|text| parse_assignment(text))
                .collect::<Result<Vec<_>>>()?;
            let container = Container::new(
                schema,
                values.iter().map(|(name, value)| (name.as_str(), value.clone())),
            )
            .with_context(|| format!("build {}", schema.name()))?;
            let frame = encode_message(&container)?;
            println!("{}", hidpp_codec_core::value::to_hex(&frame));
            if summary {
                print!("{}", container.summary());
            }
        }
    }

    Ok(())
}
