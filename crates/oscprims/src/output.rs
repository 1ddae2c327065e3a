use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use oscprims_codec::{encode, Message, Value};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    address: &'a str,
    type_tags: String,
    args: Vec<ArgOutput>,
    timestamp: String,
}

#[derive(Serialize)]
struct ArgOutput {
    #[serde(rename = "type")]
    kind: &'static str,
    value: serde_json::Value,
}

impl From<&Value> for ArgOutput {
    fn from(value: &Value) -> Self {
        let json = match value {
            Value::Int32(v) => serde_json::Value::from(*v),
            Value::Float32(v) => serde_json::Value::from(*v),
            Value::String(v) => serde_json::Value::from(v.as_str()),
            Value::Blob(v) => serde_json::Value::from(hex::encode(v)),
            Value::True => serde_json::Value::Bool(true),
            Value::False => serde_json::Value::Bool(false),
            Value::Nil => serde_json::Value::Null,
        };
        Self {
            kind: value.tag().name(),
            value: json,
        }
    }
}

pub fn print_message(message: &Message, format: OutputFormat) {
    print_messages(std::slice::from_ref(message), format);
}

pub fn print_messages(messages: &[Message], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let timestamp = now_unix_seconds();
            for message in messages {
                let out = MessageOutput {
                    address: message.address(),
                    type_tags: type_tags(message),
                    args: message.iter().map(ArgOutput::from).collect(),
                    timestamp: timestamp.clone(),
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ADDRESS", "TAGS", "ARGS"]);
            for message in messages {
                let args: Vec<String> = message.iter().map(Value::to_string).collect();
                table.add_row(vec![
                    message.address().to_string(),
                    type_tags(message),
                    args.join(" "),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for message in messages {
                println!("{message}");
            }
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout();
            for message in messages {
                let _ = out.write_all(&encode(message));
            }
            let _ = out.flush();
        }
    }
}

fn type_tags(message: &Message) -> String {
    let mut tags = String::from(",");
    tags.extend(message.type_tags().map(|tag| tag.as_byte() as char));
    tags
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
