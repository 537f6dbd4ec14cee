//! Recursive parser for hwasm programs.
//!
//! Consumes the token stream under the three-section grammar (`define`,
//! `macro`, `code`), expands macros by token substitution, assigns label
//! offsets, and pushes typed instruction descriptors into the interpreter
//! as they are parsed; there is no intermediate tree.

use std::collections::HashMap;

use tracing::{debug, warn};

use hwasm_lexer::{Token, TokenKind};
use hwasm_runtime::{ArrItem, Interpreter, Op};

use crate::error::ParseError;
use crate::stream::TokenStream;

/// A recorded macro: parameter names plus the captured body token span.
struct Macro {
    params: Vec<String>,
    body: Vec<Token>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Define,
    Macro,
    Code,
}

/// Parse a tokenized program, pushing definitions, labels, and instructions
/// into `state` as they are read.
pub fn parse(tokens: Vec<Token>, state: &mut Interpreter) -> Result<(), ParseError> {
    Parser::new(tokens).run(state)
}

struct Parser {
    stream: TokenStream,
    /// Count of non-executable slots (section headers, label markers) seen
    /// so far; label targets subtract it from the token's line position so
    /// they land on instruction-sequence indices.
    labels_offset: i32,
    current_section: Option<Section>,
    macros: HashMap<String, Macro>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser {
            stream: TokenStream::new(tokens),
            labels_offset: 0,
            current_section: None,
            macros: HashMap::new(),
        }
    }

    fn run(mut self, state: &mut Interpreter) -> Result<(), ParseError> {
        while !self.stream.check(TokenKind::Eof) {
            if self.stream.check(TokenKind::Instruction) {
                self.accept_instruction(state)?;
            } else if self.stream.match_kind(TokenKind::At) {
                self.accept_label(state)?;
            } else if self.stream.match_kind(TokenKind::Dot) {
                self.accept_section()?;
            } else if self.current_is_macro() {
                let name = self.stream.next_word()?;
                self.apply_macro(&name, state)?;
            } else {
                return Err(ParseError::unexpected(self.stream.peek()));
            }
        }
        Ok(())
    }

    fn accept_section(&mut self) -> Result<(), ParseError> {
        let line = self.stream.line();
        let section = self.stream.next_word()?;

        match section.as_str() {
            "define" => {
                if self.current_section == Some(Section::Define) {
                    return Err(ParseError::invalid_section(
                        ".define section may be declared at most once",
                        line,
                    ));
                }
                if self.current_section.is_some() {
                    return Err(ParseError::invalid_section(
                        ".define section must be declared before all others",
                        line,
                    ));
                }
                self.current_section = Some(Section::Define);
            }
            "macro" => {
                if self.current_section == Some(Section::Code) {
                    return Err(ParseError::invalid_section(
                        ".macro section cannot be declared after the .code section",
                        line,
                    ));
                }
                self.current_section = Some(Section::Macro);
                self.accept_macro()?;
            }
            "code" => {
                if self.current_section == Some(Section::Code) {
                    return Err(ParseError::invalid_section(
                        ".code section cannot be declared twice",
                        line,
                    ));
                }
                self.current_section = Some(Section::Code);
            }
            other => warn!(section = other, "unknown section ignored"),
        }

        // Section headers occupy one label-offset slot.
        self.labels_offset += 1;

        Ok(())
    }

    fn accept_label(&mut self, state: &mut Interpreter) -> Result<(), ParseError> {
        if self.current_section == Some(Section::Define) {
            return Err(ParseError::invalid_section(
                "labels are not allowed within the .define section",
                self.stream.line(),
            ));
        }

        let token = self.stream.next_id()?;
        let name = token.text().unwrap_or_default();
        let offset = token.line() as i32 - self.labels_offset;

        state
            .add_label(name, offset)
            .map_err(|err| ParseError::state(err, token.line()))?;

        self.labels_offset += 1;

        Ok(())
    }

    fn accept_macro(&mut self) -> Result<(), ParseError> {
        let line = self.stream.line();
        let name = self.stream.next_word()?;

        let mut params = Vec::new();
        while !self.stream.check(TokenKind::Instruction) {
            // The parameter list runs until a mnemonic starts the body; a
            // section marker or the end of input first means there is none.
            if self.stream.check(TokenKind::Dot) || self.stream.check(TokenKind::Eof) {
                return Err(ParseError::invalid_macro(
                    format!("missing instructions for .macro '{}'", name),
                    line,
                ));
            }
            params.push(self.stream.next_word()?);
            self.stream.skip(TokenKind::Comma);
        }

        let mut body = Vec::new();
        while !self.stream.check(TokenKind::Dot) && !self.stream.check(TokenKind::Eof) {
            body.push(self.stream.next());
        }

        debug!(name = %name, params = params.len(), tokens = body.len(), "macro recorded");
        self.macros.insert(name, Macro { params, body });

        Ok(())
    }

    fn current_is_macro(&self) -> bool {
        match self.stream.peek() {
            token if token.is_word() => token
                .text()
                .map(|name| self.macros.contains_key(name))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Expand a macro invocation in place and reparse the splice point.
    ///
    /// Substitution is purely lexical: body words matching a parameter name
    /// become the caller's argument token, nothing is scoped or hygienic.
    fn apply_macro(&mut self, name: &str, state: &mut Interpreter) -> Result<(), ParseError> {
        // The macro-name token has already been consumed.
        let apply_pos = self.stream.pos() - 1;
        let line = self.stream.line();

        let mut args = Vec::new();
        while !self.stream.check(TokenKind::Instruction) && !self.stream.check(TokenKind::Eof) {
            args.push(self.stream.next());
            self.stream.skip(TokenKind::Comma);
        }

        let mac = &self.macros[name];
        if mac.params.len() != args.len() {
            return Err(ParseError::invalid_macro(
                format!(
                    "wrong number of arguments for .macro '{}': expected {}, got {}",
                    name,
                    mac.params.len(),
                    args.len()
                ),
                line,
            ));
        }

        let expansion: Vec<Token> = mac
            .body
            .iter()
            .map(|token| {
                let substitute = token
                    .is_word()
                    .then(|| token.text())
                    .flatten()
                    .and_then(|text| mac.params.iter().position(|param| param.as_str() == text));
                match substitute {
                    Some(index) => args[index].clone(),
                    None => token.clone(),
                }
            })
            .collect();

        debug!(name, "macro expanded");
        self.stream.splice(apply_pos, expansion);

        self.accept_instruction(state)
    }

    fn accept_instruction(&mut self, state: &mut Interpreter) -> Result<(), ParseError> {
        let token = self.stream.next_id()?;
        let line = token.line();
        let name = token.text().unwrap_or_default().to_string();

        if matches!(name.as_str(), "reg" | "arr" | "usr")
            && self.current_section != Some(Section::Define)
        {
            return Err(ParseError::invalid_section(
                format!(
                    "invalid instruction syntax '{}', allowed only within the .define section",
                    name
                ),
                line,
            ));
        }

        let op = match name.as_str() {
            "rvr" => Op::Reverse {
                arr: self.stream.next_word()?,
            },
            "jxt" => {
                let arr = self.stream.next_word()?;
                self.stream.expect(TokenKind::Comma)?;
                Op::IterJump {
                    arr,
                    label: self.stream.next_word()?,
                }
            }
            "arr" => {
                let arr_name = self.stream.next_word()?;
                self.stream.expect(TokenKind::LBracket)?;
                let mut items = Vec::new();
                while !self.stream.match_kind(TokenKind::RBracket) {
                    if self.stream.check(TokenKind::Number) {
                        items.push(ArrItem::Value(self.stream.next_number()?));
                    } else if self.stream.check(TokenKind::Word) {
                        items.push(ArrItem::Ref(self.stream.next_word()?));
                    } else {
                        return Err(ParseError::expected(
                            "number or word",
                            self.stream.peek(),
                        ));
                    }
                    self.stream.skip(TokenKind::Comma);
                }
                Op::DefineArr {
                    name: arr_name,
                    items,
                }
            }
            "ret" => {
                if self.stream.check(TokenKind::Word) {
                    Op::ReturnCell {
                        cell: self.stream.next_word()?,
                    }
                } else {
                    Op::Return
                }
            }
            "rst" => Op::Reset {
                reg: self.stream.next_word()?,
            },
            "clr" => Op::Clear {
                reg: self.stream.next_word()?,
            },
            "usr" => {
                let reg = self.stream.next_word()?;
                self.stream.expect(TokenKind::Comma)?;
                Op::Subscribe {
                    reg,
                    label: self.stream.next_word()?,
                }
            }
            "ext" => {
                if self.stream.check(TokenKind::Word) {
                    Op::ExitCell {
                        cell: self.stream.next_word()?,
                    }
                } else {
                    Op::ExitPop
                }
            }
            "pln" => {
                if self.stream.check(TokenKind::Word) {
                    Op::PrintCell {
                        cell: self.stream.next_word()?,
                    }
                } else if self.stream.check(TokenKind::Number) {
                    Op::PrintValue {
                        value: self.stream.next_number()?,
                    }
                } else {
                    Op::PrintPop
                }
            }
            "jmp" => Op::Jump {
                label: self.stream.next_word()?,
            },
            "jeq" => {
                if self.stream.check(TokenKind::Word) {
                    let cell = self.stream.next_word()?;
                    self.stream.expect(TokenKind::Comma)?;
                    Op::JumpEqCell {
                        cell,
                        label: self.stream.next_word()?,
                    }
                } else {
                    let value = self.stream.next_number()?;
                    self.stream.expect(TokenKind::Comma)?;
                    Op::JumpEqValue {
                        value,
                        label: self.stream.next_word()?,
                    }
                }
            }
            "jnq" => {
                if self.stream.check(TokenKind::Word) {
                    let cell = self.stream.next_word()?;
                    self.stream.expect(TokenKind::Comma)?;
                    Op::JumpNeCell {
                        cell,
                        label: self.stream.next_word()?,
                    }
                } else {
                    let value = self.stream.next_number()?;
                    self.stream.expect(TokenKind::Comma)?;
                    Op::JumpNeValue {
                        value,
                        label: self.stream.next_word()?,
                    }
                }
            }
            "reg" => {
                let reg_name = self.stream.next_word()?;
                let initial = if self.stream.match_kind(TokenKind::Comma) {
                    Some(self.stream.next_number()?)
                } else {
                    None
                };
                Op::DefineReg {
                    name: reg_name,
                    initial,
                }
            }
            "upd" => Op::Update {
                reg: self.stream.next_word()?,
            },
            "dup" => {
                if self.stream.check(TokenKind::Word) {
                    Op::DupCell {
                        cell: self.stream.next_word()?,
                    }
                } else {
                    Op::Dup
                }
            }
            "mov" => {
                let reg = self.stream.next_word()?;
                if self.stream.match_kind(TokenKind::Comma) {
                    if self.stream.check(TokenKind::Number) {
                        Op::MovValue {
                            reg,
                            value: self.stream.next_number()?,
                        }
                    } else {
                        Op::MovCell {
                            reg,
                            cell: self.stream.next_word()?,
                        }
                    }
                } else {
                    Op::MovPop { reg }
                }
            }
            "psh" => {
                if self.stream.check(TokenKind::Number) {
                    Op::PushValue {
                        value: self.stream.next_number()?,
                    }
                } else {
                    Op::PushCell {
                        cell: self.stream.next_word()?,
                    }
                }
            }
            "run" => {
                if self
                    .stream
                    .pattern(TokenKind::Number, TokenKind::Comma, TokenKind::Word)
                {
                    let value = self.stream.next_number()?;
                    self.stream.expect(TokenKind::Comma)?;
                    Op::SpawnValue {
                        value,
                        label: self.stream.next_word()?,
                    }
                } else if self
                    .stream
                    .pattern(TokenKind::Word, TokenKind::Comma, TokenKind::Word)
                {
                    let cell = self.stream.next_word()?;
                    self.stream.expect(TokenKind::Comma)?;
                    Op::SpawnCell {
                        cell,
                        label: self.stream.next_word()?,
                    }
                } else {
                    Op::Spawn {
                        label: self.stream.next_word()?,
                    }
                }
            }
            "pop" => {
                if self.stream.check(TokenKind::Word) {
                    Op::DropCell {
                        cell: self.stream.next_word()?,
                    }
                } else {
                    Op::Drop
                }
            }
            "cal" => Op::Call {
                label: self.stream.next_word()?,
            },
            "clu" => Op::DisableUpdates,
            "seu" => Op::EnableUpdates,
            "req" => {
                let mut cells = Vec::new();
                while self.stream.check(TokenKind::Word) {
                    cells.push(self.stream.next_word()?);
                    self.stream.skip(TokenKind::Comma);
                }
                Op::Require { cells }
            }
            other => {
                // A word in instruction position can only be a macro call
                // (reachable through expansion); anything else, including
                // the reserved mnemonics, is unimplemented.
                if self.macros.contains_key(other) {
                    return self.apply_macro(&name, state);
                }
                return Err(ParseError::unknown_instruction(other, line));
            }
        };

        state
            .add_instruction(op)
            .map_err(|err| ParseError::state(err, line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;
    use hwasm_lexer::tokenize;

    fn parse_into(source: &str) -> Result<Interpreter, ParseError> {
        let mut state = Interpreter::new();
        parse(tokenize(source), &mut state)?;
        Ok(state)
    }

    fn kind_of(source: &str) -> ParseErrorKind {
        parse_into(source).unwrap_err().kind
    }

    #[test]
    fn test_label_offsets_map_to_instruction_indices() {
        let state = parse_into(
            ".define\n\
             reg rf\n\
             arr rs [1, 2, 3]\n\
             .code\n\
             seu\n\
             @l1\n\
             mov rf, rs\n\
             jxt rs, l1\n\
             @l2\n\
             clu",
        )
        .unwrap();
        // Instruction sequence: reg, arr, seu, mov, jxt, clu.
        assert_eq!(state.lookup_label("l1").unwrap(), 3);
        assert_eq!(state.lookup_label("l2").unwrap(), 5);
        assert_eq!(state.instruction_count(), 6);
    }

    #[test]
    fn test_define_must_come_first() {
        assert_eq!(kind_of(".code\nseu\n.define\nreg r"), ParseErrorKind::InvalidSection);
    }

    #[test]
    fn test_define_at_most_once() {
        assert_eq!(kind_of(".define\nreg r\n.define\nreg s"), ParseErrorKind::InvalidSection);
    }

    #[test]
    fn test_macro_section_cannot_follow_code() {
        assert_eq!(
            kind_of(".code\nseu\n.macro inc x mov x, 1"),
            ParseErrorKind::InvalidSection
        );
    }

    #[test]
    fn test_definitions_are_define_section_only() {
        assert_eq!(kind_of(".code\nreg r"), ParseErrorKind::InvalidSection);
        assert_eq!(kind_of(".code\narr a [1]"), ParseErrorKind::InvalidSection);
        assert_eq!(kind_of(".code\nusr r, l"), ParseErrorKind::InvalidSection);
    }

    #[test]
    fn test_labels_are_illegal_inside_define() {
        assert_eq!(kind_of(".define\n@nope\nreg r"), ParseErrorKind::InvalidSection);
    }

    #[test]
    fn test_duplicate_label_is_fatal() {
        assert_eq!(kind_of(".code\n@l\nseu\n@l\nclu"), ParseErrorKind::State);
    }

    #[test]
    fn test_macro_expansion_counts_as_ordinary_instruction() {
        let expanded = parse_into(
            ".define\nreg rf\n.macro inc x mov x, 1\n.code\ninc rf\nclu",
        )
        .unwrap();
        let literal = parse_into(".define\nreg rf\n.code\nmov rf, 1\nclu").unwrap();
        assert_eq!(expanded.instruction_count(), literal.instruction_count());
    }

    #[test]
    fn test_macro_with_multiple_instructions_and_params() {
        let state = parse_into(
            ".define\nreg a\nreg b\n\
             .macro pair x, y mov x, 1 mov y, 2\n\
             .code\npair a, b\nclu",
        )
        .unwrap();
        // reg, reg, mov, mov, clu
        assert_eq!(state.instruction_count(), 5);
    }

    #[test]
    fn test_macro_arity_mismatch() {
        assert_eq!(
            kind_of(".define\nreg a\n.macro inc x mov x, 1\n.code\ninc a, a\nclu"),
            ParseErrorKind::InvalidMacro
        );
    }

    #[test]
    fn test_macro_without_body() {
        assert_eq!(kind_of(".macro empty x\n.code\nseu"), ParseErrorKind::InvalidMacro);
    }

    #[test]
    fn test_reserved_mnemonics_are_unimplemented() {
        for mnemonic in ["bpt", "swp", "rvt"] {
            assert_eq!(
                kind_of(&format!(".code\n{}", mnemonic)),
                ParseErrorKind::UnknownInstruction
            );
        }
    }

    #[test]
    fn test_unexpected_token_at_top_level() {
        assert_eq!(kind_of("loop"), ParseErrorKind::UnexpectedToken);
    }

    #[test]
    fn test_number_literal_radixes_parse_in_instructions() {
        // Definitions take effect at bind time; parsing only records them.
        let state = parse_into(".define\nreg r, 0x1A\n.code\npsh 0b101\npsh 10").unwrap();
        assert_eq!(state.instruction_count(), 3);
    }

    #[test]
    fn test_run_operand_shapes() {
        let state = parse_into(
            ".code\n@start\nseu\nrun start\nrun 5, start\nrun rs, start",
        );
        // `run rs, start` names a cell that is never defined; parsing still
        // succeeds; resolution happens at bind time.
        assert_eq!(state.unwrap().instruction_count(), 4);
    }

    #[test]
    fn test_overflowing_literal_is_invalid() {
        assert_eq!(kind_of(".code\npsh 4294967296"), ParseErrorKind::InvalidNumber);
    }

    #[test]
    fn test_missing_macro_body_terminator_at_eof() {
        // Body collection stops at end of input; the body is non-empty so
        // the declaration is accepted and nothing else follows.
        let state = parse_into(".define\nreg r\n.macro inc x mov x, 1").unwrap();
        assert_eq!(state.instruction_count(), 1);
    }
}
