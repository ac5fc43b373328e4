use cwasm_macros::declare_error_type;
use miette::Diagnostic;
use thiserror::Error;

declare_error_type! {
    #[error("optimization flag error: {0}")]
    pub enum FlagError {
        UnknownFlag(UnknownFlagError),
        UnknownPreset(UnknownPresetError),
        FlagsFile(FlagsFileError),
    }
}

pub type FlagResult<T> = Result<T, FlagError>;

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(
    code(opt::unknown_flag),
    help("run with --verbose to list the known optimization flags")
)]
#[error("unknown optimization flag '{name}'")]
pub struct UnknownFlagError {
    pub name: String,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(opt::unknown_preset), help("the presets are 'none' and 'default'"))]
#[error("unknown optimization preset '{name}'")]
pub struct UnknownPresetError {
    pub name: String,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(opt::flags_file))]
#[error("invalid optimization flags file: {reason}")]
pub struct FlagsFileError {
    pub reason: String,
}
