use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tiny_essentials::i18n::render::display_value;
use tiny_essentials::{Translator, TranslatorConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Inspect and render file-backed locale resources
#[derive(Debug, Parser)]
#[command(name = "tiny-essentials", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Translate one key
    Translate {
        #[command(flatten)]
        locales: LocaleArgs,

        /// Key to resolve
        key: String,

        /// Interpolation parameter as name=value; repeatable
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Resolve through the pattern table instead of the exact-key table
        #[arg(long)]
        pattern: bool,
    },
    /// Print per-locale entry counts as JSON
    Stats {
        #[command(flatten)]
        locales: LocaleArgs,
    },
}

#[derive(Debug, Args)]
struct LocaleArgs {
    /// Directory holding `<locale>.json` files
    #[arg(long, env = "TINY_I18N_BASE_PATH")]
    base_path: PathBuf,

    /// Locale that is always loaded and searched last
    #[arg(long, env = "TINY_I18N_DEFAULT_LOCALE", default_value = "en")]
    default_locale: String,

    /// Locale to select on top of the default
    #[arg(long)]
    locale: Option<String>,

    /// Fail on missing keys, bad regexes and unreadable files
    #[arg(long, env = "TINY_I18N_STRICT")]
    strict: bool,
}

impl LocaleArgs {
    async fn translator(&self) -> Result<Translator> {
        let config = TranslatorConfig::file_backed(&self.default_locale, &self.base_path)
            .with_strict(self.strict);
        let mut translator = Translator::new(config)?;
        translator.init().await?;
        translator
            .set_locale(self.locale.as_deref())
            .await
            .with_context(|| format!("Failed to select locale {:?}", self.locale))?;
        Ok(translator)
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiny_essentials=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Translate {
            locales,
            key,
            params,
            pattern,
        } => {
            let translator = locales.translator().await?;
            let params: Map<String, Value> = params
                .into_iter()
                .map(|(name, value)| (name, Value::String(value)))
                .collect();
            let params = Value::Object(params);

            let rendered = if pattern {
                translator.render_pattern(&key, Some(&params), None)?
            } else {
                translator.get(&key, Some(&params), None)?
            };
            println!("{}", display_value(&rendered));
        }
        Command::Stats { locales } => {
            let translator = locales.translator().await?;
            println!("{}", serde_json::to_string_pretty(&translator.stats())?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("name=Ana"), Ok(("name".to_string(), "Ana".to_string())));
        assert_eq!(parse_param("eq=a=b"), Ok(("eq".to_string(), "a=b".to_string())));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_cli_parses_translate() {
        let cli = Cli::try_parse_from([
            "tiny-essentials",
            "translate",
            "--base-path",
            "locales",
            "--locale",
            "pt",
            "greet",
            "-p",
            "name=Ana",
        ])
        .unwrap();

        let Command::Translate { locales, key, params, pattern } = cli.command else {
            panic!("expected translate");
        };
        assert_eq!(key, "greet");
        assert_eq!(locales.locale.as_deref(), Some("pt"));
        assert_eq!(params, vec![("name".to_string(), "Ana".to_string())]);
        assert!(!pattern);
    }
}
