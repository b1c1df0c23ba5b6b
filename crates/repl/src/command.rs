//! Parsing of interactive commands
//!
//! Commands may be abbreviated to any unique prefix of their name. A few
//! short aliases (`r`, `c`, `s`, `i`, `b`, `bt`, `q`) win over prefix matching.

use transport::{DataRequest, EventKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakTarget {
    Function(String),
    Event(EventKind),
}

impl BreakTarget {
    pub fn parse(s: &str) -> Self {
        match s.parse::<EventKind>() {
            Ok(event) => BreakTarget::Event(event),
            Err(_) => BreakTarget::Function(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run,
    Continue,
    Step,
    Interrupt,
    Break { target: BreakTarget, enabled: bool },
    State { path: Option<String> },
    Data(DataRequest),
    Module { name: String, activate: bool },
    Backtrace,
    Status,
    Kill,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command `{0}'.")]
    Unknown(String),
    #[error("Ambiguous command `{0}'.")]
    Ambiguous(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Invalid number `{0}'.")]
    Number(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Run,
    Continue,
    Step,
    Interrupt,
    Break,
    Unbreak,
    State,
    Texture,
    Framebuffer,
    Shader,
    InfoLog,
    Buffer,
    Enable,
    Disable,
    Backtrace,
    Status,
    Kill,
    Quit,
}

const VERBS: &[(&str, Verb)] = &[
    ("run", Verb::Run),
    ("continue", Verb::Continue),
    ("step", Verb::Step),
    ("interrupt", Verb::Interrupt),
    ("break", Verb::Break),
    ("unbreak", Verb::Unbreak),
    ("state", Verb::State),
    ("texture", Verb::Texture),
    ("framebuffer", Verb::Framebuffer),
    ("shader", Verb::Shader),
    ("infolog", Verb::InfoLog),
    ("buffer", Verb::Buffer),
    ("enable", Verb::Enable),
    ("disable", Verb::Disable),
    ("backtrace", Verb::Backtrace),
    ("status", Verb::Status),
    ("kill", Verb::Kill),
    ("quit", Verb::Quit),
];

const ALIASES: &[(&str, Verb)] = &[
    ("r", Verb::Run),
    ("c", Verb::Continue),
    ("s", Verb::Step),
    ("i", Verb::Interrupt),
    ("b", Verb::Break),
    ("bt", Verb::Backtrace),
    ("q", Verb::Quit),
];

fn resolve(word: &str) -> Result<Verb, ParseError> {
    if let Some((_, verb)) = ALIASES
        .iter()
        .chain(VERBS)
        .find(|(name, _)| *name == word)
    {
        return Ok(*verb);
    }

    let mut matches = VERBS.iter().filter(|(name, _)| name.starts_with(word));
    match (matches.next(), matches.next()) {
        (Some((_, verb)), None) => Ok(*verb),
        (Some(_), Some(_)) => Err(ParseError::Ambiguous(word.to_string())),
        (None, _) => Err(ParseError::Unknown(word.to_string())),
    }
}

/// Accepts decimal or `0x`-prefixed hex, since most fields are API enums
fn number(s: &str) -> Result<u32, ParseError> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| ParseError::Number(s.to_string()))
}

fn numbers<const N: usize>(args: &[&str], usage: &'static str) -> Result<[u32; N], ParseError> {
    if args.len() != N {
        return Err(ParseError::Usage(usage));
    }
    let mut out = [0; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = number(arg)?;
    }
    Ok(out)
}

fn single<'a>(args: &[&'a str], usage: &'static str) -> Result<&'a str, ParseError> {
    match args {
        [one] => Ok(*one),
        _ => Err(ParseError::Usage(usage)),
    }
}

fn no_args(verb: Verb, args: &[&str], command: Command) -> Result<Command, ParseError> {
    if args.is_empty() {
        return Ok(command);
    }
    let name = VERBS
        .iter()
        .find(|(_, v)| *v == verb)
        .map(|(name, _)| *name)
        .unwrap_or_default();
    Err(ParseError::Unknown(format!("{name} {}", args.join(" "))))
}

/// Parse one input line; blank lines give `None`
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((first, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match resolve(first)? {
        verb @ Verb::Run => no_args(verb, args, Command::Run)?,
        verb @ Verb::Continue => no_args(verb, args, Command::Continue)?,
        verb @ Verb::Step => no_args(verb, args, Command::Step)?,
        verb @ Verb::Interrupt => no_args(verb, args, Command::Interrupt)?,
        verb @ Verb::Backtrace => no_args(verb, args, Command::Backtrace)?,
        verb @ Verb::Status => no_args(verb, args, Command::Status)?,
        verb @ Verb::Kill => no_args(verb, args, Command::Kill)?,
        verb @ Verb::Quit => no_args(verb, args, Command::Quit)?,
        verb @ (Verb::Break | Verb::Unbreak) => {
            let target = single(args, "break FUNCTION | error | compile-error | link-error")?;
            Command::Break {
                target: BreakTarget::parse(target),
                enabled: verb == Verb::Break,
            }
        }
        Verb::State => match args {
            [] => Command::State { path: None },
            [path] => Command::State {
                path: Some(path.to_string()),
            },
            _ => return Err(ParseError::Usage("state [PATH]")),
        },
        Verb::Texture => {
            let [object, target, face, level, format, ty] =
                numbers(args, "texture OBJECT TARGET FACE LEVEL FORMAT TYPE")?;
            Command::Data(DataRequest::Texture {
                object,
                target,
                face,
                level,
                format,
                ty,
            })
        }
        Verb::Framebuffer => {
            let [object, target, buffer, format, ty] =
                numbers(args, "framebuffer OBJECT TARGET BUFFER FORMAT TYPE")?;
            Command::Data(DataRequest::Framebuffer {
                object,
                target,
                buffer,
                format,
                ty,
            })
        }
        Verb::Shader => {
            let [object, target] = numbers(args, "shader OBJECT TARGET")?;
            Command::Data(DataRequest::Shader { object, target })
        }
        Verb::InfoLog => {
            let [object, target] = numbers(args, "infolog OBJECT TARGET")?;
            Command::Data(DataRequest::InfoLog { object, target })
        }
        Verb::Buffer => {
            let [object] = numbers(args, "buffer OBJECT")?;
            Command::Data(DataRequest::Buffer { object })
        }
        verb @ (Verb::Enable | Verb::Disable) => Command::Module {
            name: single(args, "enable MODULE | disable MODULE")?.to_string(),
            activate: verb == Verb::Enable,
        },
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_and_prefixes() {
        assert_eq!(parse("r"), Ok(Some(Command::Run)));
        assert_eq!(parse("s"), Ok(Some(Command::Step)));
        assert_eq!(parse("cont"), Ok(Some(Command::Continue)));
        assert_eq!(parse("inter"), Ok(Some(Command::Interrupt)));
        assert_eq!(parse("  quit  "), Ok(Some(Command::Quit)));
        assert_eq!(parse("bt"), Ok(Some(Command::Backtrace)));
        assert_eq!(parse("back"), Ok(Some(Command::Backtrace)));
        // `b` stays break even though backtrace shares the prefix
        assert!(matches!(parse("b"), Err(ParseError::Usage(usage)) if usage.starts_with("break")));
        assert_eq!(parse(""), Ok(None));
    }

    #[test]
    fn prefix_errors() {
        assert_eq!(parse("st"), Err(ParseError::Ambiguous("st".to_string())));
        assert_eq!(parse("frob"), Err(ParseError::Unknown("frob".to_string())));
        assert_eq!(
            ParseError::Ambiguous("st".to_string()).to_string(),
            "Ambiguous command `st'."
        );
    }

    #[test]
    fn break_targets() {
        assert_eq!(
            parse("b glDrawArrays"),
            Ok(Some(Command::Break {
                target: BreakTarget::Function("glDrawArrays".to_string()),
                enabled: true
            }))
        );
        assert_eq!(
            parse("unbreak compile-error"),
            Ok(Some(Command::Break {
                target: BreakTarget::Event(EventKind::CompileError),
                enabled: false
            }))
        );
        assert!(matches!(parse("break"), Err(ParseError::Usage(_))));
    }

    #[test]
    fn data_requests_take_numbers() {
        assert_eq!(
            parse("texture 3 0x0de1 0 0 0x1908 0x1401"),
            Ok(Some(Command::Data(DataRequest::Texture {
                object: 3,
                target: 0x0de1,
                face: 0,
                level: 0,
                format: 0x1908,
                ty: 0x1401,
            })))
        );
        assert_eq!(
            parse("buffer 7"),
            Ok(Some(Command::Data(DataRequest::Buffer { object: 7 })))
        );
        assert_eq!(parse("shader x 1"), Err(ParseError::Number("x".to_string())));
        assert!(matches!(parse("infolog 1"), Err(ParseError::Usage(_))));
    }

    #[test]
    fn state_and_modules() {
        assert_eq!(parse("state"), Ok(Some(Command::State { path: None })));
        assert_eq!(
            parse("state GL_TEXTURE_2D"),
            Ok(Some(Command::State {
                path: Some("GL_TEXTURE_2D".to_string())
            }))
        );
        assert_eq!(
            parse("disable showstats"),
            Ok(Some(Command::Module {
                name: "showstats".to_string(),
                activate: false
            }))
        );
    }

    #[test]
    fn stray_arguments_are_rejected() {
        assert_eq!(
            parse("run now"),
            Err(ParseError::Unknown("run now".to_string()))
        );
    }
}
