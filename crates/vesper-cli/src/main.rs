mod config;
mod helpers;
mod report;

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use vesper::program::serialize::MAGIC;
use vesper::runtime::ComponentDefinition;
use vesper::wire::SerializedTemplate;
use vesper::{CompileError, Environment, Program, Reference, Registry, TrackedObject, Value};
use vesper_dom::SimpleDocument;

use config::Config;

#[derive(Parser)]
#[command(name = "vesper")]
#[command(about = "Compile, inspect and render Vesper templates")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ./vesper.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile template IR (JSON) to a program file
    Compile {
        #[command(flatten)]
        input: Input,

        /// Output path (default: the input with a `.vspr` extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep opcode names in the output
        #[arg(long)]
        debug_names: bool,
    },
    /// Print a program listing
    Disasm {
        #[command(flatten)]
        input: Input,
    },
    /// Render a template and print the HTML after every pass
    Render {
        #[command(flatten)]
        input: Input,

        /// JSON file bound to `this`
        #[arg(long)]
        data: Option<PathBuf>,

        /// JSON object merged into `this` before an update pass; repeatable
        #[arg(long)]
        update: Vec<PathBuf>,

        /// Leave `javascript:` URLs alone
        #[arg(long)]
        no_sanitize: bool,

        /// Skip modifiers
        #[arg(long = "static")]
        static_only: bool,
    },
}

#[derive(Args)]
struct Input {
    /// Template IR (.json) or compiled program
    file: PathBuf,

    /// Directory of template-only components, one `<Name>.json` each
    #[arg(long)]
    components: Option<PathBuf>,

    /// Template source the IR spans point into, for error reports
    #[arg(long)]
    source: Option<PathBuf>,

    /// Fall back to `this.<name>` for unknown free names
    #[arg(long)]
    lenient: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Compile { input, output, debug_names } => {
            config.compile.debug_names |= debug_names;
            compile(&input, output, &mut config)
        }
        Commands::Disasm { input } => {
            let (_, program) = load(&input, &mut config)?;
            print!("{}", program.disassemble());
            Ok(())
        }
        Commands::Render { input, data, update, no_sanitize, static_only } => {
            config.render.sanitize_urls &= !no_sanitize;
            config.render.interactive &= !static_only;
            render(&input, data.as_deref(), &update, &mut config)
        }
    }
}

fn compile(input: &Input, output: Option<PathBuf>, config: &mut Config) -> Result<()> {
    let (_, program) = load(input, config)?;
    let output = output.unwrap_or_else(|| input.file.with_extension("vspr"));
    let bytes = program
        .to_bytes(config.compile.debug_names)
        .context("Failed to encode program")?;
    fs::write(&output, &bytes).with_context(|| format!("Failed to write {}", output.display()))?;
    eprintln!(
        "{} -> {} ({} heap words, {} bytes)",
        input.file.display(),
        output.display(),
        program.heap().len(),
        bytes.len()
    );
    Ok(())
}

fn render(input: &Input, data: Option<&Path>, updates: &[PathBuf], config: &mut Config) -> Result<()> {
    render_passes(input, data, updates, config, |html| println!("{html}"))
}

/// Runs the append pass and one update pass per file in `updates`, handing
/// the document's HTML to `emit` after each.
fn render_passes(
    input: &Input,
    data: Option<&Path>,
    updates: &[PathBuf],
    config: &mut Config,
    mut emit: impl FnMut(String),
) -> Result<()> {
    let (registry, program) = load(input, config)?;

    let this = match data {
        Some(path) => Value::from_json(&read_json(path)?),
        None => Value::object(TrackedObject::new()),
    };
    let env = Rc::new(Environment::new(Rc::new(registry)).with_config(config.render));
    let mut doc = SimpleDocument::new();
    let root = doc.root();
    let mut result = vesper::render(Rc::new(program), env, &mut doc, root, None, Reference::constant(this.clone()))?;
    emit(doc.to_html(root));

    for path in updates {
        let serde_json::Value::Object(fields) = read_json(path)? else {
            bail!("{}: an update must be a JSON object", path.display());
        };
        let Some(state) = this.as_object() else {
            bail!("updates need `this` to be an object; pass --data with a JSON object");
        };
        for (key, value) in &fields {
            state.set(key, Value::from_json(value));
        }
        let stats = result.rerender(&mut doc)?;
        log::info!(
            "{}: {} visited, {} revalidated, {} replayed, {} mutations",
            path.display(),
            stats.visited,
            stats.revalidated,
            stats.replayed,
            stats.mutations
        );
        emit(doc.to_html(root));
    }

    result.destroy(&mut doc);
    Ok(())
}

/// Builds the registry and loads `input`: program files are decoded, IR is
/// compiled. Registration order is fixed (helpers, then components by name)
/// so handles in a cached program match a fresh registry.
fn load(input: &Input, config: &mut Config) -> Result<(Registry, Program)> {
    config.compile.strict &= !input.lenient;
    let mut registry = Registry::with_options(config.compile);
    helpers::register(&mut registry)?;
    if let Some(dir) = &input.components {
        register_components(&mut registry, dir)?;
    }

    let bytes = fs::read(&input.file).with_context(|| format!("Failed to read {}", input.file.display()))?;
    if bytes.starts_with(&MAGIC) {
        let program = Program::from_bytes(&bytes).with_context(|| format!("Failed to load {}", input.file.display()))?;
        log::debug!("loaded program {} ({} heap words)", input.file.display(), program.heap().len());
        return Ok((registry, program));
    }

    let json = String::from_utf8(bytes).with_context(|| format!("{} is not UTF-8", input.file.display()))?;
    let template = SerializedTemplate::from_json(&json)
        .with_context(|| format!("Failed to parse template IR in {}", input.file.display()))?;
    match registry.compile(&template) {
        Ok(program) => Ok((registry, program)),
        Err(err) => Err(compile_failure(err, input)),
    }
}

fn register_components(registry: &mut Registry, dir: &Path) -> Result<()> {
    let mut files = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    files.retain(|path| path.extension().is_some_and(|ext| ext == "json"));
    files.sort();

    for path in files {
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let json = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let template = SerializedTemplate::from_json(&json)
            .with_context(|| format!("Failed to parse component {}", path.display()))?;
        registry.register(ComponentDefinition::template_only(name, template))?;
        log::debug!("registered component {name}");
    }
    Ok(())
}

fn compile_failure(err: CompileError, input: &Input) -> anyhow::Error {
    if let Some(path) = &input.source {
        match fs::read_to_string(path) {
            Ok(source) => {
                if report::compile_error(&err, &path.display().to_string(), &source) {
                    return anyhow::anyhow!("{} failed to compile", input.file.display());
                }
            }
            Err(read_err) => log::warn!("cannot read {}: {read_err}", path.display()),
        }
    }
    anyhow::Error::new(err).context(format!("{} failed to compile", input.file.display()))
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}
