use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use abic::abi::{AbiDef, AbiView};
use abic::codec::Codec;
use abic::compile::{c_source_from_abi, CodegenOptions};
use abic::fingerprint::hash_abi_view;
use abic::resolver::TypeGraph;

#[derive(Parser)]
#[command(name = "abic")]
#[command(version = abic::ABIC_VERSION)]
#[command(about = "Antelope ABI compiler (ABI -> C codec modules).", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Generate the C codec module for an ABI.
    Emit {
        #[arg(long)]
        abi: PathBuf,
        #[arg(long, default_value = "abi_codec")]
        module: String,
        /// Write the source here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        no_pack: bool,
        #[arg(long)]
        no_unpack: bool,
        #[arg(long)]
        debug: bool,
    },
    /// Print the ABI type-content fingerprint.
    Hash {
        #[arg(long)]
        abi: PathBuf,
    },
    /// Decode a hex buffer as the given type and print it as JSON.
    Unpack {
        #[arg(long)]
        abi: PathBuf,
        #[arg(long, value_name = "TYPE")]
        type_name: String,
        #[arg(long)]
        hex: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Emit {
            abi,
            module,
            out,
            no_pack,
            no_unpack,
            debug,
        } => {
            let view = load_view(&abi)?;
            let options = CodegenOptions {
                with_pack: !no_pack,
                with_unpack: !no_unpack,
                debug,
            };
            let output = c_source_from_abi(&module, &view, &options)
                .with_context(|| format!("generate module {module}"))?;
            match out {
                Some(path) => std::fs::write(&path, output.c_src)
                    .with_context(|| format!("write {}", path.display()))?,
                None => print!("{}", output.c_src),
            }
        }
        Cmd::Hash { abi } => {
            let view = load_view(&abi)?;
            println!("{}", hash_abi_view(&view));
        }
        Cmd::Unpack {
            abi,
            type_name,
            hex,
        } => {
            let view = load_view(&abi)?;
            let graph = TypeGraph::from_abi(&view).context("resolve ABI")?;
            let codec = Codec::new(&graph);
            let buf = parse_hex(&hex)?;
            let (value, consumed) = codec
                .unpack_with_consumed(&type_name, &buf)
                .with_context(|| format!("unpack {type_name}"))?;
            let mut rendered = value.to_json();
            if let serde_json::Value::Object(map) = &mut rendered {
                map.insert("__consumed".to_string(), consumed.into());
            }
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
    }
    Ok(())
}

fn load_view(path: &PathBuf) -> Result<AbiView> {
    let def = AbiDef::from_file(path)?;
    Ok(AbiView::new(&def))
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if s.len() % 2 != 0 {
        bail!("hex input has odd length");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).context("invalid hex digit"))
        .collect()
}
