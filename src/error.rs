//! Error types for the NC execution engine.
//!
//! Mirrors the error-enum-per-layer shape used throughout this codebase:
//! each failure category gets its own `thiserror` enum with named fields,
//! and a top-level [`NcError`] unifies them with `#[from]` conversions.
//! The three categories correspond to the original implementation's
//! `ExceptionTyps` (`CodeErrors`, `CanalStarErrors`, generic control
//! errors); the unification lets callers match broadly or narrowly as
//! needed.

use thiserror::Error;

/// Structured location information attached to every NC error.
///
/// `column` and `context` are best-effort: the lexer infers `column` from
/// the first occurrence of the offending value within the source line, and
/// `context` carries that raw line for caret-indicated display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorLocation {
    pub line: u32,
    pub column: Option<u32>,
    pub context: Option<String>,
    pub canal: u32,
}

impl ErrorLocation {
    pub fn new(line: u32, canal: u32) -> Self {
        Self { line, column: None, context: None, canal }
    }

    /// Infer `column` as the 1-based index of `value`'s first occurrence in
    /// `source_line`, if present.
    pub fn with_context(mut self, source_line: impl Into<String>, value: &str) -> Self {
        let source_line = source_line.into();
        if !value.is_empty() {
            if let Some(idx) = source_line.find(value) {
                self.column = Some(idx as u32 + 1);
            }
        }
        self.context = Some(source_line);
        self
    }
}

/// Parser/structural errors, stable numeric codes per spec.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodeError {
    #[error("duplication of parameter: {value}")]
    DuplicateParameter { value: String, loc: ErrorLocation },

    #[error("duplication of macro and NC command: {value}")]
    DuplicateMacroAndCommand { value: String, loc: ErrorLocation },

    #[error("conflicting speed-mode codes (G96/G97): {value}")]
    ConflictingSpeedMode { value: String, loc: ErrorLocation },

    #[error("conflicting feed-mode codes: {value}")]
    ConflictingFeedMode { value: String, loc: ErrorLocation },

    #[error("conflicting polar coordinate codes (G112/G113): {value}")]
    ConflictingPolarCodes { value: String, loc: ErrorLocation },

    #[error("polar interpolation axis not recognised: {value}")]
    UnrecognisedPolarAxis { value: String, loc: ErrorLocation },

    #[error("conflicting plane selection codes (G17/G18/G19): {value}")]
    ConflictingPlaneCodes { value: String, loc: ErrorLocation },

    #[error("lower-case parameter letter: {value}")]
    LowerCaseParameter { value: String, loc: ErrorLocation },

    #[error("tool number out of range ({min}-{max}): {value}")]
    ToolOutOfRange { value: String, min: i64, max: i64, loc: ErrorLocation },

    #[error("cutter compensation already active in a different direction: {value}")]
    CutterCompDirectionConflict { value: String, loc: ErrorLocation },

    #[error("invalid cutter compensation quadrant (expected 1..9): {value}")]
    InvalidCutterCompQuadrant { value: String, loc: ErrorLocation },

    #[error("invalid cutter compensation radius (must be positive): {value}")]
    InvalidCutterCompRadius { value: String, loc: ErrorLocation },

    #[error("invalid arc: {reason}")]
    InvalidArc { reason: String, loc: ErrorLocation },

    #[error("arc interpolation outside the XY plane is not supported: {value}")]
    UnsupportedArcPlane { value: String, loc: ErrorLocation },
}

impl CodeError {
    /// The stable numeric code used in the request/response error payload.
    pub fn code(&self) -> i32 {
        match self {
            CodeError::DuplicateParameter { .. } => -2,
            CodeError::DuplicateMacroAndCommand { .. } => -3,
            CodeError::CutterCompDirectionConflict { .. } => -104,
            CodeError::InvalidCutterCompQuadrant { .. } => -102,
            CodeError::InvalidCutterCompRadius { .. } => -107,
            CodeError::ToolOutOfRange { .. } => 200,
            CodeError::ConflictingSpeedMode { .. } => 100,
            CodeError::ConflictingFeedMode { .. } => 101,
            CodeError::ConflictingPolarCodes { .. } => 110,
            CodeError::UnrecognisedPolarAxis { .. } => 111,
            CodeError::ConflictingPlaneCodes { .. } => 120,
            CodeError::LowerCaseParameter { .. } => 130,
            CodeError::InvalidArc { .. } | CodeError::UnsupportedArcPlane { .. } => 150,
        }
    }

    pub fn loc(&self) -> &ErrorLocation {
        match self {
            CodeError::DuplicateParameter { loc, .. }
            | CodeError::DuplicateMacroAndCommand { loc, .. }
            | CodeError::ConflictingSpeedMode { loc, .. }
            | CodeError::ConflictingFeedMode { loc, .. }
            | CodeError::ConflictingPolarCodes { loc, .. }
            | CodeError::UnrecognisedPolarAxis { loc, .. }
            | CodeError::ConflictingPlaneCodes { loc, .. }
            | CodeError::LowerCaseParameter { loc, .. }
            | CodeError::ToolOutOfRange { loc, .. }
            | CodeError::CutterCompDirectionConflict { loc, .. }
            | CodeError::InvalidCutterCompQuadrant { loc, .. }
            | CodeError::InvalidCutterCompRadius { loc, .. }
            | CodeError::InvalidArc { loc, .. }
            | CodeError::UnsupportedArcPlane { loc, .. } => loc,
        }
    }
}

/// Multi-canal wait-code synchronization errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanalSyncError {
    #[error("selected canal does not exist")]
    CanalCountMismatch,

    #[error("wait codes do not match between canals 1 and 2: {code_a} != {code_b}")]
    PairMismatch12 { code_a: i64, code_b: i64 },

    #[error("wait codes do not match between canals 1 and 3: {code_a} != {code_b}")]
    PairMismatch13 { code_a: i64, code_b: i64 },

    #[error("wait codes do not match between canals 2 and 3: {code_a} != {code_b}")]
    PairMismatch23 { code_a: i64, code_b: i64 },

    #[error("wait codes do not match across all three canals: {code_a}, {code_b}, {code_c}")]
    TripleMismatch { code_a: i64, code_b: i64, code_c: i64 },

    #[error("synchronizer exceeded its iteration cap")]
    IterationCapExceeded,
}

impl CanalSyncError {
    pub fn code(&self) -> i32 {
        match self {
            CanalSyncError::CanalCountMismatch => 201,
            CanalSyncError::PairMismatch12 { .. } => 202,
            CanalSyncError::PairMismatch13 { .. } => 205,
            CanalSyncError::PairMismatch23 { .. } => 206,
            CanalSyncError::TripleMismatch { .. } => 207,
            CanalSyncError::IterationCapExceeded => 208,
        }
    }
}

/// Catch-all for non-structured failures surfaced while walking a canal
/// (e.g. a handler panic caught at the boundary, or an invariant violation).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("control error at line {line} (canal {canal}): {message}")]
pub struct ControlError {
    pub message: String,
    pub line: u32,
    pub canal: u32,
}

/// Unified error type for the engine's public API.
#[derive(Error, Debug, Clone)]
pub enum NcError {
    #[error(transparent)]
    Code(#[from] CodeError),

    #[error(transparent)]
    CanalSync(#[from] CanalSyncError),

    #[error(transparent)]
    Control(#[from] ControlError),
}

impl NcError {
    /// The stable numeric code used in the structured error payload (§6/§7).
    pub fn code(&self) -> i32 {
        match self {
            NcError::Code(e) => e.code(),
            NcError::CanalSync(e) => e.code(),
            NcError::Control(_) => -1,
        }
    }

    pub fn line(&self) -> u32 {
        match self {
            NcError::Code(e) => e.loc().line,
            NcError::Control(e) => e.line,
            NcError::CanalSync(_) => 0,
        }
    }

    pub fn canal(&self) -> u32 {
        match self {
            NcError::Code(e) => e.loc().canal,
            NcError::Control(e) => e.canal,
            NcError::CanalSync(_) => 0,
        }
    }
}

pub type Result<T> = std::result::Result<T, NcError>;
