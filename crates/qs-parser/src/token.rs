use qs_core::SourceSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Var,
    Function,
    On,
    Node,
    If,
    Else,
    For,
    In,
    While,
    Return,
    And,
    Or,
    Not,
    Npc,
    Actor,
    Dialogue,
    Quest,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Self> {
        let keyword = match word {
            "var" => Self::Var,
            "function" => Self::Function,
            "on" => Self::On,
            "node" => Self::Node,
            "if" => Self::If,
            "else" => Self::Else,
            "for" => Self::For,
            "in" => Self::In,
            "while" => Self::While,
            "return" => Self::Return,
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            "npc" => Self::Npc,
            "actor" => Self::Actor,
            "dialogue" => Self::Dialogue,
            "quest" => Self::Quest,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Var => "var",
            Self::Function => "function",
            Self::On => "on",
            Self::Node => "node",
            Self::If => "if",
            Self::Else => "else",
            Self::For => "for",
            Self::In => "in",
            Self::While => "while",
            Self::Return => "return",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Npc => "npc",
            Self::Actor => "actor",
            Self::Dialogue => "dialogue",
            Self::Quest => "quest",
        }
    }

    /// Operator words never double as identifiers.
    pub fn is_operator_word(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Not)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Keyword(Keyword),
    String(String),
    Number(f64),
    True,
    False,
    Null,
    /// Verbatim text between `<%` and `%>`.
    ForeignCode(String),

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    AmpAmp,
    PipePipe,

    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            Self::Identifier(name) => format!("identifier '{}'", name),
            Self::Keyword(keyword) => format!("keyword '{}'", keyword.as_str()),
            Self::String(_) => "string literal".to_string(),
            Self::Number(_) => "number literal".to_string(),
            Self::True => "'true'".to_string(),
            Self::False => "'false'".to_string(),
            Self::Null => "'null'".to_string(),
            Self::ForeignCode(_) => "foreign code block".to_string(),
            Self::Eof => "end of input".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Semicolon => ";",
            Self::Colon => ":",
            Self::Dot => ".",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bang => "!",
            Self::BangEqual => "!=",
            Self::Equal => "=",
            Self::EqualEqual => "==",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::AmpAmp => "&&",
            Self::PipePipe => "||",
            _ => "",
        }
    }

    /// The name this token spells when used in identifier position.
    pub fn as_name(&self) -> Option<String> {
        match self {
            Self::Identifier(name) => Some(name.clone()),
            Self::Keyword(keyword) if !keyword.is_operator_word() => {
                Some(keyword.as_str().to_string())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: SourceSpan,
}
