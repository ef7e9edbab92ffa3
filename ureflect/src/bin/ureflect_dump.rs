use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use clap::Parser;
use memmap2::{Mmap, MmapOptions};
use serde::Serialize;
use ureflect::ureflect_stream::{NameTable, ObjectTable, Package};
use ureflect::{
    LoadReport, PropertyDataBlock, Schema, Script, StructLayout, StructRegistry, TokenRecord,
    read_properties,
};

/// Resolve struct layouts from a JSON schema and optionally decode a tagged
/// property blob or a compiled script against them.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON schema with the struct definitions
    schema: PathBuf,

    /// Only report this struct (required with --tagged)
    #[arg(long = "struct")]
    struct_name: Option<String>,

    /// Package name table, one name per line in index order
    #[arg(long)]
    names: Option<PathBuf>,

    /// Package format version used for the streams
    #[arg(long, default_value_t = 69)]
    format_version: u32,

    /// Tagged property blob to load over the struct's defaults
    #[arg(long)]
    tagged: Option<PathBuf>,

    /// Compiled script blob to decode
    #[arg(long)]
    script: Option<PathBuf>,

    /// Declared decoded size of the script (defaults to the blob length)
    #[arg(long)]
    script_size: Option<usize>,

    /// Emit a JSON report instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    layouts: Vec<LayoutReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<ValuesReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tokens: Option<Vec<TokenRecord>>,
}

#[derive(Serialize)]
struct LayoutReport {
    name: String,
    base: Option<String>,
    size: usize,
    alignment: usize,
    properties: Vec<PropertyReport>,
}

#[derive(Serialize)]
struct PropertyReport {
    name: String,
    kind: String,
    owner: String,
    offset: usize,
    bit_mask: u32,
    array_dim: usize,
    size: usize,
}

#[derive(Serialize)]
struct ValuesReport {
    load: LoadReport,
    values: Vec<(String, String)>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::init();

    let schema = Schema::from_path(&args.schema)
        .with_context(|| format!("reading schema {}", args.schema.display()))?;
    let mut registry = StructRegistry::with_builtins();
    registry
        .register_schema(schema)
        .context("registering schema structs")?;

    let layouts = match &args.struct_name {
        Some(name) => vec![
            registry
                .resolve(name)
                .with_context(|| format!("resolving struct {name}"))?,
        ],
        None => registry.resolve_all().context("resolving schema structs")?,
    };

    let names = match &args.names {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading name table {}", path.display()))?;
            NameTable::from_names(text.lines().map(str::trim).filter(|line| !line.is_empty()))
        }
        None => NameTable::new(),
    };
    let package = Package::with_tables(args.format_version, names, ObjectTable::default());

    let values = match &args.tagged {
        Some(path) => {
            let [layout] = layouts.as_slice() else {
                bail!("--tagged needs --struct to pick the target layout");
            };
            Some(load_values(&package, layout, path)?)
        }
        None => None,
    };

    let tokens = match &args.script {
        Some(path) => {
            let mmap = map_file(path)?;
            let script_size = args.script_size.unwrap_or(mmap.len());
            let script = Script::decode(&mut package.stream(&mmap), script_size)
                .with_context(|| format!("decoding script {}", path.display()))?;
            Some(script.walk().context("walking decoded script")?)
        }
        None => None,
    };

    let report = Report {
        layouts: layouts.iter().map(|layout| layout_report(layout)).collect(),
        values,
        tokens,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mmap = unsafe { MmapOptions::new().map(&file) }
        .with_context(|| format!("memory-mapping {}", path.display()))?;
    Ok(mmap)
}

fn load_values(package: &Package, layout: &std::sync::Arc<StructLayout>, path: &Path) -> Result<ValuesReport> {
    let mmap = map_file(path)?;
    let mut block = PropertyDataBlock::new_default(layout.clone(), None)
        .with_context(|| format!("constructing {}", layout.name()))?;
    let mut stream = package.stream(&mmap);
    let load = read_properties(&mut block, &mut stream)
        .with_context(|| format!("loading tagged properties from {}", path.display()))?;
    ensure!(
        stream.remaining() == 0,
        "{} trailing bytes after the property list",
        stream.remaining()
    );

    let mut values = Vec::new();
    for prop in layout.properties() {
        for index in 0..prop.array_dim() {
            let label = if prop.array_dim() > 1 {
                format!("{}[{index}]", prop.name())
            } else {
                prop.name().to_string()
            };
            values.push((label, block.print_value(prop, index, package)?));
        }
    }
    Ok(ValuesReport { load, values })
}

fn layout_report(layout: &StructLayout) -> LayoutReport {
    LayoutReport {
        name: layout.name().to_string(),
        base: layout.base().map(|base| base.name().to_string()),
        size: layout.size(),
        alignment: layout.alignment(),
        properties: layout
            .properties()
            .iter()
            .map(|prop| PropertyReport {
                name: prop.name().to_string(),
                kind: prop.ty().to_string(),
                owner: prop.owner().to_string(),
                offset: prop.offset(),
                bit_mask: prop.bit_mask(),
                array_dim: prop.array_dim(),
                size: prop.size(),
            })
            .collect(),
    }
}

fn print_report(report: &Report) {
    for layout in &report.layouts {
        match &layout.base {
            Some(base) => println!("struct {} : {} ({} bytes)", layout.name, base, layout.size),
            None => println!("struct {} ({} bytes)", layout.name, layout.size),
        }
        for prop in &layout.properties {
            let mask = if prop.bit_mask != 0 {
                format!("mask {:#010x}", prop.bit_mask)
            } else {
                String::new()
            };
            println!(
                "  {:>6}  {:<24} {:<20} x{:<3} {}",
                prop.offset, prop.name, prop.kind, prop.array_dim, mask
            );
        }
    }

    if let Some(values) = &report.values {
        println!(
            "loaded {} properties, skipped {}",
            values.load.loaded,
            values.load.skipped.len()
        );
        for name in &values.load.skipped {
            println!("  skipped {name}");
        }
        for (name, value) in &values.values {
            println!("  {name} = {value}");
        }
    }

    if let Some(tokens) = &report.tokens {
        for token in tokens {
            println!(
                "{:>6}  {}{}",
                token.offset,
                "  ".repeat(token.depth),
                token.opcode
            );
        }
    }
}
