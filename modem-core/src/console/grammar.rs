#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for the operator console.
//!
//! The lexer uses `regal` to produce a bounded token stream; the parser walks
//! that slice by hand. Keywords are matched case-insensitively against
//! [`CATALOG`], which also feeds `help`.

use core::fmt;
use core::ops::Range;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;

/// Maximum number of tokens produced per console line.
pub const MAX_TOKENS: usize = 16;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Lexical token kinds recognized by the console grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Keyword, topic or access point name.
    #[regex(r"[A-Za-z][A-Za-z0-9._-]*")]
    Ident,
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Anything else.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token emitted by the lexer with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

/// Bounded token buffer.
pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    TooManyTokens { processed: usize },
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "token buffer exhausted after {processed} items")
            }
            LexError::Engine => write!(f, "lexer engine error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarError<'a> {
    Empty,
    UnknownCommand { lexeme: &'a str, span: Range<usize> },
    MissingArgument { command: &'static str, expected: &'static str },
    UnexpectedToken { lexeme: &'a str, span: Range<usize> },
    InvalidToken { lexeme: &'a str, span: Range<usize> },
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::Empty => f.write_str("empty command"),
            GrammarError::UnknownCommand { lexeme, .. } => write!(f, "unknown command `{lexeme}`"),
            GrammarError::MissingArgument { command, expected } => {
                write!(f, "{command} expects {expected}")
            }
            GrammarError::UnexpectedToken { lexeme, span } => {
                write!(f, "unexpected `{lexeme}` at {span:?}")
            }
            GrammarError::InvalidToken { lexeme, span } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
        }
    }
}

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Setup,
    Power,
    Wake,
    Connect { apn: &'a str },
    Disconnect,
    Time,
    Signal,
    Sleep,
    Status,
    Cycle,
    Help { topic: Option<&'a str> },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CommandTag {
    Setup,
    Power,
    Wake,
    Connect,
    Disconnect,
    Time,
    Signal,
    Sleep,
    Status,
    Cycle,
    Help,
}

/// Catalog entry describing one console command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommandInfo {
    pub keyword: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
    tag: CommandTag,
}

const fn info(
    keyword: &'static str,
    usage: &'static str,
    summary: &'static str,
    tag: CommandTag,
) -> CommandInfo {
    CommandInfo {
        keyword,
        usage,
        summary,
        tag,
    }
}

/// Every command the console accepts.
pub const CATALOG: [CommandInfo; 11] = [
    info("setup", "setup", "drive every control line to idle", CommandTag::Setup),
    info("power", "power", "apply power to the modem", CommandTag::Power),
    info("wake", "wake", "run the wake sequence and AT handshake", CommandTag::Wake),
    info("connect", "connect <apn>", "register and open a data session", CommandTag::Connect),
    info("disconnect", "disconnect", "close the data session", CommandTag::Disconnect),
    info("time", "time", "query network time", CommandTag::Time),
    info("signal", "signal", "read signal, battery and temperature", CommandTag::Signal),
    info("sleep", "sleep", "power the modem down", CommandTag::Sleep),
    info("status", "status", "show lifecycle state and cycle flags", CommandTag::Status),
    info("cycle", "cycle", "start a logger cycle: reset flags, set up, power, wake", CommandTag::Cycle),
    info("help", "help [command]", "list commands or describe one", CommandTag::Help),
];

/// Looks up a catalog entry case-insensitively.
pub fn find(keyword: &str) -> Option<&'static CommandInfo> {
    CATALOG
        .iter()
        .find(|entry| entry.keyword.eq_ignore_ascii_case(keyword))
}

/// Tokenize the provided line.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        let lexeme = &line[span.clone()];
        push(
            &mut buffer,
            Token {
                kind: record.token,
                lexeme,
                span,
            },
        )?;
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let span = start..start + partial.fragment.len();
        push(
            &mut buffer,
            Token {
                kind: TokenKind::Error,
                lexeme: partial.fragment,
                span,
            },
        )?;
    }

    Ok(buffer)
}

fn push<'a>(buffer: &mut TokenBuffer<'a>, token: Token<'a>) -> Result<(), LexError> {
    buffer.push(token).map_err(|_| LexError::TooManyTokens {
        processed: MAX_TOKENS + 1,
    })
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parse a console command from the provided line.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::InvalidToken {
            lexeme: token.lexeme,
            span: token.span.clone(),
        }));
    }

    let mut words = tokens.iter().filter(|token| token.kind == TokenKind::Ident);
    let keyword = words.next().ok_or(ParseError::Grammar(GrammarError::Empty))?;
    let entry = find(keyword.lexeme).ok_or_else(|| {
        ParseError::Grammar(GrammarError::UnknownCommand {
            lexeme: keyword.lexeme,
            span: keyword.span.clone(),
        })
    })?;

    let argument = words.next();
    let command = match (entry.tag, argument) {
        (CommandTag::Connect, Some(apn)) => Command::Connect { apn: apn.lexeme },
        (CommandTag::Connect, None) => {
            return Err(ParseError::Grammar(GrammarError::MissingArgument {
                command: "connect",
                expected: "an access point name",
            }));
        }
        (CommandTag::Help, topic) => Command::Help {
            topic: topic.map(|token| token.lexeme),
        },
        (_, Some(extra)) => return Err(unexpected(extra)),
        (CommandTag::Setup, None) => Command::Setup,
        (CommandTag::Power, None) => Command::Power,
        (CommandTag::Wake, None) => Command::Wake,
        (CommandTag::Disconnect, None) => Command::Disconnect,
        (CommandTag::Time, None) => Command::Time,
        (CommandTag::Signal, None) => Command::Signal,
        (CommandTag::Sleep, None) => Command::Sleep,
        (CommandTag::Status, None) => Command::Status,
        (CommandTag::Cycle, None) => Command::Cycle,
    };

    if let Some(extra) = words.next() {
        return Err(unexpected(extra));
    }

    Ok(command)
}

fn unexpected<'a>(token: &Token<'a>) -> ParseError<'a> {
    ParseError::Grammar(GrammarError::UnexpectedToken {
        lexeme: token.lexeme,
        span: token.span.clone(),
    })
}
