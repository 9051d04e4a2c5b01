pub mod ast;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod token;
pub mod visit;

pub use ast::*;
pub use lexer::{Lexer, FOREIGN_CLOSE, FOREIGN_OPEN};
pub use parser::{parse_program, parse_script, Parser};
pub use printer::{print_expr, print_program};
pub use token::{Keyword, Token, TokenKind};
pub use visit::{
    collect_declarations, walk_block, walk_expr, walk_program, walk_stmt, DeclarationSummary,
    Owned, Visitor,
};
