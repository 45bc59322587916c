use crate::protocol::error::ErrorCode;

/// Option keys are a single lowercase letter plus the free-text sentinel `-`,
/// which gives 27 possible slots per command line.
const OPTION_SLOTS: usize = 27;
const FREE_TEXT_SLOT: usize = 26;

/// Parsed `-<key> <value>` options of one command line.
#[derive(Debug, Default)]
pub struct Args {
    values: [Option<String>; OPTION_SLOTS],
}

impl Args {
    fn slot(opt: u8) -> Option<usize> {
        match opt {
            b'a'..=b'z' => Some((opt - b'a') as usize),
            b'-' => Some(FREE_TEXT_SLOT),
            _ => None,
        }
    }

    pub fn get(&self, opt: char) -> Option<&str> {
        let slot = Self::slot(opt as u8)?;
        self.values[slot].as_deref()
    }

    pub fn contains(&self, opt: char) -> bool {
        self.get(opt).is_some()
    }

    /// Integer view of an option value. A present but malformed number reads
    /// as `None`, the same as an absent option.
    pub fn get_int(&self, opt: char) -> Option<i64> {
        self.get(opt).and_then(|v| v.parse().ok())
    }

    fn set(&mut self, opt: u8, value: String) -> Result<(), ErrorCode> {
        let slot = Args::slot(opt).ok_or(ErrorCode::Parse)?;
        if self.values[slot].is_some() {
            return Err(ErrorCode::DuplicateArguments);
        }
        self.values[slot] = Some(value);
        Ok(())
    }
}

/// A failed parse still carries everything recognized up to the point of
/// failure: the dispatcher wants the command name and the transaction id for
/// the error response whenever they were readable.
#[derive(Debug)]
pub struct ParseError {
    pub command: Option<String>,
    pub args: Args,
    pub code: ErrorCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    OptFollows,
    SepFollows,
    ValueFollowsFirstChar,
    ValueFollows,
    Quoted,
    SkipChar,
    EscapedCharFollows,
}

/// Remove the escaping backslashes of a quoted value: a backslash makes the
/// next character literal, whatever it is.
fn unescape(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut escaped = false;
    for &b in raw {
        if escaped {
            out.push(b);
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else {
            out.push(b);
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Split one protocol line into the command name and its option map.
///
/// The command name is everything up to the first space. The remainder is a
/// sequence of `-<char> <value>` pairs separated by single spaces; `value`
/// may be double-quoted (and must be, when embedded spaces are wanted and the
/// option is not the free-text option `-`), a backslash inside quotes escapes
/// the next character. The free-text option swallows the rest of the line
/// verbatim.
pub fn parse_command(line: &str) -> Result<(String, Args), ParseError> {
    let mut args = Args::default();

    let Some(space) = line.find(' ') else {
        // No options at all. A non-empty line is a bare command, an empty
        // one is nothing.
        if line.is_empty() {
            return Err(ParseError {
                command: None,
                args,
                code: ErrorCode::Parse,
            });
        }
        return Ok((line.to_string(), args));
    };

    let command = line[..space].to_string();
    let rest = line[space + 1..].as_bytes();

    let fail = |command: &str, args: Args, code| {
        Err(ParseError {
            command: Some(command.to_string()),
            args,
            code,
        })
    };

    let mut state = State::Normal;
    let mut opt = b' ';
    let mut value_begin = 0usize;

    // One trailing NUL plays the role of the C string terminator: the last
    // unquoted value is delimited by it.
    for pos in 0..=rest.len() {
        let b = if pos < rest.len() { rest[pos] } else { b'\0' };

        match state {
            State::Normal => {
                if b != b'-' {
                    return fail(&command, args, ErrorCode::Parse);
                }
                state = State::OptFollows;
            }
            State::OptFollows => {
                opt = b;
                state = State::SepFollows;
            }
            State::SepFollows => {
                if b != b' ' {
                    return fail(&command, args, ErrorCode::Parse);
                }
                state = State::ValueFollowsFirstChar;
                value_begin = pos + 1;
            }
            State::ValueFollowsFirstChar => {
                // The first value character is never a terminator; a leading
                // space simply becomes part of the value.
                if b == b'"' && opt != b'-' {
                    value_begin = pos + 1;
                    state = State::Quoted;
                } else {
                    state = State::ValueFollows;
                }
            }
            State::ValueFollows => {
                if (b == b' ' && opt != b'-') || b == b'\0' {
                    if let Err(code) =
                        args.set(opt, String::from_utf8_lossy(&rest[value_begin..pos]).into_owned())
                    {
                        return fail(&command, args, code);
                    }
                    state = State::Normal;
                }
            }
            State::Quoted => {
                if b == b'\\' {
                    state = State::EscapedCharFollows;
                } else if b == b'"' {
                    if let Err(code) = args.set(opt, unescape(&rest[value_begin..pos])) {
                        return fail(&command, args, code);
                    }
                    state = State::SkipChar;
                } else if b == b'\0' {
                    // The closing quote never came.
                    return fail(&command, args, ErrorCode::Parse);
                }
            }
            State::SkipChar => {
                state = State::Normal;
            }
            State::EscapedCharFollows => {
                if b == b'\0' {
                    return fail(&command, args, ErrorCode::Parse);
                }
                state = State::Quoted;
            }
        }

        if b == b'\0' {
            break;
        }
    }

    Ok((command, args))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_commands() {
        struct TestCase {
            input: &'static str,
            command: &'static str,
            options: Vec<(char, &'static str)>,
        }

        let cases = [
            TestCase {
                input: "status",
                command: "status",
                options: vec![],
            },
            TestCase {
                input: "feature_get -i 5 -n encoding",
                command: "feature_get",
                options: vec![('i', "5"), ('n', "encoding")],
            },
            TestCase {
                input: "breakpoint_set -i 1 -t line -f test.php -n 10",
                command: "breakpoint_set",
                options: vec![('i', "1"), ('t', "line"), ('f', "test.php"), ('n', "10")],
            },
            TestCase {
                input: r#"property_get -i 7 -n "some name""#,
                command: "property_get",
                options: vec![('i', "7"), ('n', "some name")],
            },
            TestCase {
                input: r#"eval -i 2 -n "a \"quoted\" value""#,
                command: "eval",
                options: vec![('i', "2"), ('n', "a \"quoted\" value")],
            },
            // The free-text option takes the rest of the line, spaces,
            // quotes and all.
            TestCase {
                input: "eval -i 5 -- MSsx with spaces",
                command: "eval",
                options: vec![('i', "5"), ('-', "MSsx with spaces")],
            },
        ];

        for tc in cases {
            let (command, args) = parse_command(tc.input).unwrap();
            assert_eq!(command, tc.command);
            for (opt, expected) in tc.options {
                assert_eq!(args.get(opt), Some(expected), "option -{opt} of {}", tc.input);
            }
        }
    }

    #[test]
    fn test_parse_failures() {
        struct TestCase {
            input: &'static str,
            code: ErrorCode,
        }

        let cases = [
            TestCase {
                input: "",
                code: ErrorCode::Parse,
            },
            TestCase {
                input: "run extra",
                code: ErrorCode::Parse,
            },
            TestCase {
                input: "breakpoint_set -i 1 -i 2",
                code: ErrorCode::DuplicateArguments,
            },
            TestCase {
                input: r#"eval -i 1 -n "never closed"#,
                code: ErrorCode::Parse,
            },
            // Trailing garbage where `-` is expected.
            TestCase {
                input: "status -i 1 ",
                code: ErrorCode::Parse,
            },
        ];

        for tc in cases {
            let err = parse_command(tc.input).unwrap_err();
            assert_eq!(err.code, tc.code, "input: {:?}", tc.input);
        }
    }

    #[test]
    fn test_partial_state_kept_on_failure() {
        let err = parse_command("breakpoint_set -i 42 -t line -t call").unwrap_err();
        assert_eq!(err.command.as_deref(), Some("breakpoint_set"));
        assert_eq!(err.args.get('i'), Some("42"));
        assert_eq!(err.code, ErrorCode::DuplicateArguments);
    }

    #[test]
    fn test_reparse_is_deterministic() {
        let input = r#"breakpoint_set -i 3 -t conditional -f a.rs -n 7 -- Y29uZA=="#;
        let (c1, a1) = parse_command(input).unwrap();
        let (c2, a2) = parse_command(input).unwrap();
        assert_eq!(c1, c2);
        for opt in ['i', 't', 'f', 'n', '-'] {
            assert_eq!(a1.get(opt), a2.get(opt));
        }
    }

    #[test]
    fn test_get_int() {
        let (_, args) = parse_command("stack_get -i 1 -d 3 -n nope").unwrap();
        assert_eq!(args.get_int('d'), Some(3));
        assert_eq!(args.get_int('n'), None);
        assert_eq!(args.get_int('x'), None);
    }
}
