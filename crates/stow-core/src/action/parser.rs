//! Touchpoint instruction syntax.
//!
//! An instruction body is a `;`-separated list of action calls:
//!
//! ```text
//! mkdir(path:${installFolder}/plugins);unzip(source:@artifact,target:${installFolder}/plugins)
//! ```
//!
//! Argument values may reference profile variables as `${name}` and encode
//! reserved characters as `${#NN}` (decimal code point, e.g. `${#44}` for `,`).

use std::collections::BTreeMap;

use crate::error::InstructionError;

/// Arguments of one action call, after variable expansion.
pub type ActionArgs = BTreeMap<String, String>;

/// One `name(key:value,...)` call from an instruction body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstruction {
    pub name: String,
    pub arguments: ActionArgs,
}

/// Split an instruction body into action calls.
///
/// Values are returned verbatim; call [`expand_variables`] on each one.
pub fn parse_instructions(body: &str) -> Result<Vec<ParsedInstruction>, InstructionError> {
    body.split(';')
        .map(str::trim)
        .filter(|call| !call.is_empty())
        .map(parse_call)
        .collect()
}

fn parse_call(call: &str) -> Result<ParsedInstruction, InstructionError> {
    let malformed = || InstructionError::Malformed(call.to_string());

    let open = call.find('(').ok_or_else(malformed)?;
    let inner = call[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
    let name = call[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return Err(malformed());
    }

    let mut arguments = ActionArgs::new();
    for argument in inner.split(',').map(str::trim).filter(|a| !a.is_empty()) {
        let (key, value) =
            argument
                .split_once(':')
                .ok_or_else(|| InstructionError::MalformedArgument {
                    action: name.to_string(),
                    argument: argument.to_string(),
                })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(InstructionError::MalformedArgument {
                action: name.to_string(),
                argument: argument.to_string(),
            });
        }
        if arguments
            .insert(key.to_string(), value.trim().to_string())
            .is_some()
        {
            return Err(InstructionError::DuplicateArgument {
                action: name.to_string(),
                argument: key.to_string(),
            });
        }
    }

    Ok(ParsedInstruction {
        name: name.to_string(),
        arguments,
    })
}

/// Replace `${name}` references using `lookup` and decode `${#NN}` escapes.
pub fn expand_variables<F>(value: &str, lookup: F) -> Result<String, InstructionError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| InstructionError::UnterminatedVariable(value.to_string()))?;
        let name = &after[..end];

        if let Some(code) = name.strip_prefix('#') {
            let decoded = code
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| InstructionError::UndefinedVariable(name.to_string()))?;
            out.push(decoded);
        } else {
            let resolved =
                lookup(name).ok_or_else(|| InstructionError::UndefinedVariable(name.to_string()))?;
            out.push_str(&resolved);
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
