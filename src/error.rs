use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AplError>;

/// Errors raised while tokenizing or compiling a source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("Invalid token")]
    BadToken,
    #[error("Too many literals")]
    TooManyLiterals,
    #[error("Invalid number")]
    BadNumber,
    #[error("Invalid string")]
    BadString,
    #[error("Code full")]
    CodeFull,
    #[error("Invalid name")]
    BadName,
    #[error("Invalid function header")]
    BadFunctionHeader,
    #[error("Invalid del command")]
    BadDelCommand,
    #[error("Invalid label")]
    BadLabel,
    #[error("Function not defined")]
    FunNotDefined,
    #[error("Function already defined")]
    FunAlreadyDefined,
    #[error("Name conflict")]
    NameConflict,
    #[error("String too long")]
    StringTooLong,
    #[error("Invalid system name")]
    BadSystemName,
}

/// Errors raised while evaluating bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EvalErrorKind {
    #[error("Not an atom")]
    NotAtom,
    #[error("Bad function")]
    BadFunction,
    #[error("Unmatched parentheses")]
    UnmatchedParens,
    #[error("Domain error")]
    Domain,
    #[error("Not conformable")]
    NotConformable,
    #[error("Operand stack overflow")]
    StackOverflow,
    #[error("Array stack overflow")]
    ArrayOverflow,
    #[error("Divide by zero")]
    DivideByZero,
    #[error("Name table full")]
    NameTableFull,
    #[error("Undefined variable")]
    UndefinedVar,
    #[error("Global desc table full")]
    DescPoolFull,
    #[error("Heap full")]
    HeapFull,
    #[error("Unmatched brackets")]
    UnmatchedBrackets,
    #[error("Invalid index")]
    InvalidIndex,
    #[error("No return value")]
    NoReturnValue,
    #[error("Syntax error")]
    SyntaxError,
    #[error("Rank error")]
    Rank,
    #[error("Length error")]
    Length,
    #[error("Not implemented")]
    NotImplemented,
    #[error("Invalid axis")]
    InvalidAxis,
    #[error("Read-only system variable")]
    ReadOnlySysVar,
    #[error("No value")]
    NoValue,
}

/// Errors raised by the function editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EditErrorKind {
    #[error("Function too big")]
    FunctionTooBig,
    #[error("Invalid line number")]
    BadLineNumber,
    #[error("Invalid editor command")]
    BadEditCommand,
    #[error("Invalid function header")]
    BadFunctionHeader,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorClass {
    Lexical(LexErrorKind),
    Eval(EvalErrorKind),
    Edit(EditErrorKind),
    /// Interpreter-state failure that must abort the process (recovery
    /// stack over/underflow, unusable workspace geometry).
    Fatal(String),
}

/// The error type propagated out of every fallible core operation.
///
/// Lexical errors may carry the offending source line and the column of
/// the character the lexer stopped at; `Display` renders the line with a
/// caret under that column before the class tag and message.
#[derive(Debug, Clone, PartialEq)]
pub struct AplError {
    pub class: ErrorClass,
    pub context: Option<SourceContext>,
}

impl std::error::Error for AplError {}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceContext {
    pub line: String,
    pub column: usize,
}

impl AplError {
    pub fn lex(kind: LexErrorKind) -> Self {
        AplError {
            class: ErrorClass::Lexical(kind),
            context: None,
        }
    }

    pub fn eval(kind: EvalErrorKind) -> Self {
        AplError {
            class: ErrorClass::Eval(kind),
            context: None,
        }
    }

    pub fn edit(kind: EditErrorKind) -> Self {
        AplError {
            class: ErrorClass::Edit(kind),
            context: None,
        }
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        AplError {
            class: ErrorClass::Fatal(msg.into()),
            context: None,
        }
    }

    pub fn with_context(mut self, line: &str, column: usize) -> Self {
        self.context = Some(SourceContext {
            line: line.to_string(),
            column,
        });
        self
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.class, ErrorClass::Fatal(_))
    }

    pub fn eval_kind(&self) -> Option<EvalErrorKind> {
        match self.class {
            ErrorClass::Eval(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn lex_kind(&self) -> Option<LexErrorKind> {
        match self.class {
            ErrorClass::Lexical(kind) => Some(kind),
            _ => None,
        }
    }
}

impl fmt::Display for AplError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ctx) = &self.context {
            writeln!(f, "{}", ctx.line)?;
            writeln!(f, "{}^", " ".repeat(ctx.column))?;
        }
        match &self.class {
            ErrorClass::Lexical(kind) => write!(f, "[LexicalError] {kind}"),
            ErrorClass::Eval(kind) => write!(f, "[EvalError] {kind}"),
            ErrorClass::Edit(kind) => write!(f, "[EditError] {kind}"),
            ErrorClass::Fatal(msg) => write!(f, "[Fatal] {msg}"),
        }
    }
}

impl From<LexErrorKind> for AplError {
    fn from(kind: LexErrorKind) -> Self {
        AplError::lex(kind)
    }
}

impl From<EvalErrorKind> for AplError {
    fn from(kind: EvalErrorKind) -> Self {
        AplError::eval(kind)
    }
}

impl From<EditErrorKind> for AplError {
    fn from(kind: EditErrorKind) -> Self {
        AplError::edit(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_tags_in_display() {
        let err = AplError::eval(EvalErrorKind::Domain);
        assert_eq!(err.to_string(), "[EvalError] Domain error");
        let err = AplError::lex(LexErrorKind::BadToken);
        assert_eq!(err.to_string(), "[LexicalError] Invalid token");
        let err = AplError::edit(EditErrorKind::BadLineNumber);
        assert_eq!(err.to_string(), "[EditError] Invalid line number");
    }

    #[test]
    fn lexical_context_renders_caret() {
        let err = AplError::lex(LexErrorKind::BadNumber).with_context("2 + 3..4", 6);
        let text = err.to_string();
        assert!(text.starts_with("2 + 3..4\n"));
        assert!(text.contains("      ^\n"));
        assert!(text.ends_with("[LexicalError] Invalid number"));
    }
}
