use clap::Parser;
use cwasm_driver::compiler::SOURCE_FILE_NAME;
use cwasm_driver::pipeline::PipelineOptions;
use cwasm_driver::{Compiler, Library};
use cwasm_opt::OptimizationFlags;
use miette::{miette, IntoDiagnostic, NamedSource, WrapErr};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser)]
#[command(version, about, long_about = None)]
struct AppArgs {
    /// The input source. If this is `-`, the input is read from stdin.
    input: String,

    /// Where to write the binary module. Defaults to the input name with a `.wasm` extension,
    /// unless one of the emit options is given.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Should the plain AST be emitted?
    #[arg(long, default_value = "false")]
    emit_ast: bool,

    /// Should the IR of each translation unit be emitted?
    #[arg(long, default_value = "false")]
    emit_ir: bool,

    /// Should the optimized module be emitted as text?
    #[arg(long, default_value = "false")]
    emit_wat: bool,

    /// Optimization preset, either `none` or `default`.
    #[arg(long = "opt", default_value = "default")]
    preset: String,

    /// Override a single optimization flag, as `name=true` or `name=false`.
    #[arg(long = "flag", value_parser = parse_flag)]
    flags: Vec<(String, bool)>,

    /// Read optimization flags from a RON file. Flags it leaves out keep their default.
    #[arg(long, conflicts_with = "preset")]
    flags_file: Option<PathBuf>,

    /// Link without the bundled runtime library.
    #[arg(long, default_value = "false")]
    no_stdlib: bool,

    /// Predefine a macro, as `NAME` or `NAME=VALUE`.
    #[arg(short = 'D', value_parser = parse_define)]
    defines: Vec<(String, String)>,

    /// Log every compilation stage to stderr.
    #[arg(long, default_value = "false")]
    verbose: bool,
}

fn parse_flag(arg: &str) -> Result<(String, bool), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=bool, found '{arg}'"))?;
    let value = value
        .parse::<bool>()
        .map_err(|_| format!("expected true or false for '{name}', found '{value}'"))?;
    Ok((name.to_owned(), value))
}

fn parse_define(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, value)) => Ok((name.to_owned(), value.to_owned())),
        None => Ok((arg.to_owned(), "1".to_owned())),
    }
}

impl AppArgs {
    fn optimization_flags(&self) -> miette::Result<OptimizationFlags> {
        let mut flags = match &self.flags_file {
            Some(path) => {
                let source = std::fs::read_to_string(path)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("failed to read {}", path.display()))?;
                OptimizationFlags::from_ron(&source)?
            }
            None => OptimizationFlags::preset(&self.preset)?,
        };
        flags.merge(self.flags.iter().map(|(name, value)| (name.as_str(), *value)))?;
        Ok(flags)
    }

    fn output_path(&self) -> Option<PathBuf> {
        if let Some(output) = &self.output {
            return Some(output.clone());
        }
        if self.emit_ast || self.emit_ir || self.emit_wat {
            return None;
        }
        match self.input.as_str() {
            "-" => Some(PathBuf::from("a.wasm")),
            path => Some(Path::new(path).with_extension("wasm")),
        }
    }
}

fn install_logging(verbose: bool) {
    let filter = match verbose {
        true => EnvFilter::new("debug"),
        false => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> miette::Result<()> {
    let args = AppArgs::parse();
    install_logging(args.verbose);

    let (name, source) = match args.input.as_str() {
        "-" => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .into_diagnostic()
                .wrap_err("failed to read from stdin")?;
            (SOURCE_FILE_NAME.to_owned(), source)
        }
        path => {
            let source = std::fs::read_to_string(path)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to read {path}"))?;
            let name = Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| miette!("input '{path}' is not a file"))?;
            (name, source)
        }
    };
    let flags = args.optimization_flags()?;
    tracing::debug!(flags = ?flags.to_map(), "optimization flags");

    let compiler = Compiler::with_options(PipelineOptions {
        emit_ast: args.emit_ast,
        emit_ir: args.emit_ir,
        emit_wat: args.emit_wat,
        flags,
        defines: args.defines.clone(),
        restricted: args.no_stdlib,
    });
    let library = (!args.no_stdlib).then(Library::standard);
    let files = BTreeMap::from([(name.clone(), source.clone())]);
    let module = compiler.compile(&files, library).map_err(|e| {
        let in_input = e.file.as_deref() == Some(name.as_str());
        let report = miette::Report::new(e);
        match in_input {
            true => report.with_source_code(NamedSource::new(&name, source.clone())),
            false => report,
        }
    })?;

    if let Some(path) = args.output_path() {
        std::fs::write(&path, module.to_bytes())
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}
