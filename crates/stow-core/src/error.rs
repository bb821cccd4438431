//! Typed errors for the parts of the engine callers may want to match on.
//!
//! Plumbing failures (I/O, transport, serialization) stay `anyhow::Error` with
//! context attached at the call site.

use thiserror::Error;

/// A touchpoint instruction that could not be turned into actions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("malformed instruction `{0}`: expected name(key:value,...)")]
    Malformed(String),

    #[error("malformed argument `{argument}` in action `{action}`")]
    MalformedArgument { action: String, argument: String },

    #[error("duplicate argument `{argument}` in action `{action}`")]
    DuplicateArgument { action: String, argument: String },

    #[error("unknown action `{action}` for touchpoint {touchpoint}")]
    UnknownAction { action: String, touchpoint: String },

    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),

    #[error("unterminated variable reference in `{0}`")]
    UnterminatedVariable(String),
}

/// Engine configuration that parsed but does not make sense.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("work split for phase `{0}` sums to zero")]
    ZeroWorkSplit(String),

    #[error("collect.max_parallel must be at least 1")]
    ZeroParallelism,

    #[error("collect.http_timeout_secs must be at least 1")]
    ZeroTimeout,

    #[error("trusted key `{name}` is invalid: {reason}")]
    InvalidKey { name: String, reason: String },
}

/// Why a single artifact failed trust verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    #[error("no descriptor found in any source")]
    NotFound,

    #[error("artifact is not signed")]
    Unsigned,

    #[error("artifact claims signer `{0}` but carries no signature")]
    MissingSignature(String),

    #[error("artifact carries a signature but names no signer")]
    MissingSigner,

    #[error("signer `{0}` is not trusted")]
    UntrustedSigner(String),

    #[error("artifact has no checksum to check the signature against")]
    MissingChecksum,

    #[error("signature is not valid base64 ed25519")]
    MalformedSignature,

    #[error("signature does not verify against signer `{0}`")]
    BadSignature(String),
}
