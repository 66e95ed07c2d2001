use std::fs;
use std::path::Path;

use regex::Regex;

use crate::instructions::instructions::{
    get_opcode, Instr, Opcode, Program, RegisterType, WordType, ARCH_REG_COUNT,
};

#[derive(Debug)]
pub(crate) enum LoadError {
    ParseError(String),
    AnalysisError(Vec<String>),
    NotFoundError(String),
    IOError(String),
}

struct Loader {
    reg_pattern: Regex,
    num_pattern: Regex,
    code: Vec<Instr>,
}

pub(crate) fn load(path: &str) -> Result<Program, LoadError> {
    if !Path::new(path).exists() {
        return Err(LoadError::NotFoundError(format!("File '{}' does not exist.", path)));
    }

    let input = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => return Err(LoadError::IOError(format!("Error reading file: {}", err))),
    };

    load_from_string(&input)
}

pub(crate) fn load_from_string(input: &str) -> Result<Program, LoadError> {
    let mut loader = Loader {
        // unwraps are fine: the patterns are literals
        reg_pattern: Regex::new(r"^[Rr](\d+)$").unwrap(),
        num_pattern: Regex::new(r"^-?\d+$").unwrap(),
        code: Vec::new(),
    };

    loader.parse(input)?;
    loader.analyze()?;

    Ok(Program { code: loader.code })
}

impl Loader {
    fn parse(&mut self, input: &str) -> Result<(), LoadError> {
        for (line_nr, raw_line) in input.lines().enumerate() {
            // strip comments
            let line = match raw_line.find(';') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let instr = self.parse_line(line, line_nr + 1)?;
            self.code.push(instr);
        }
        Ok(())
    }

    fn parse_line(&self, line: &str, line_nr: usize) -> Result<Instr, LoadError> {
        let (mnemonic, rest) = match line.find(char::is_whitespace) {
            Some(pos) => (&line[..pos], line[pos..].trim()),
            None => (line, ""),
        };

        let opcode = match get_opcode(mnemonic) {
            Some(opcode) => opcode,
            None => {
                return Err(LoadError::ParseError(format!(
                    "Unknown operation '{}' at line {}",
                    mnemonic, line_nr
                )))
            }
        };

        let operands: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(|operand| operand.trim()).collect()
        };

        let id = self.code.len();
        let mut instr = Instr::new(id, opcode);

        match opcode {
            Opcode::ADD | Opcode::SUB | Opcode::MUL | Opcode::DIV => {
                self.expect_operands(opcode, &operands, 3, line_nr)?;
                instr.dest = Some(self.parse_register(operands[0], line_nr)?);
                instr.src1 = Some(self.parse_register(operands[1], line_nr)?);
                instr.src2 = Some(self.parse_register(operands[2], line_nr)?);
            }
            Opcode::LD => {
                self.expect_operands(opcode, &operands, 2, line_nr)?;
                instr.dest = Some(self.parse_register(operands[0], line_nr)?);
                instr.address = Some(self.parse_number(operands[1], line_nr)?);
            }
            Opcode::ST => {
                self.expect_operands(opcode, &operands, 2, line_nr)?;
                instr.src1 = Some(self.parse_register(operands[0], line_nr)?);
                instr.address = Some(self.parse_number(operands[1], line_nr)?);
            }
            Opcode::BEQ | Opcode::BNE | Opcode::BGT | Opcode::BLT => {
                self.expect_operands(opcode, &operands, 3, line_nr)?;
                instr.src1 = Some(self.parse_register(operands[0], line_nr)?);
                instr.src2 = Some(self.parse_register(operands[1], line_nr)?);
                let target = self.parse_number(operands[2], line_nr)?;
                if target < 0 {
                    return Err(LoadError::ParseError(format!(
                        "Branch target '{}' can't be negative at line {}",
                        operands[2], line_nr
                    )));
                }
                instr.target = Some(target as usize);
            }
        }

        Ok(instr)
    }

    fn expect_operands(
        &self,
        opcode: Opcode,
        operands: &[&str],
        expected: usize,
        line_nr: usize,
    ) -> Result<(), LoadError> {
        if operands.len() != expected {
            return Err(LoadError::ParseError(format!(
                "{:?} expects {} operands, but {} are provided at line {}",
                opcode,
                expected,
                operands.len(),
                line_nr
            )));
        }
        Ok(())
    }

    fn parse_register(&self, operand: &str, line_nr: usize) -> Result<RegisterType, LoadError> {
        let captures = match self.reg_pattern.captures(operand) {
            Some(captures) => captures,
            None => {
                return Err(LoadError::ParseError(format!(
                    "Expected a register but found '{}' at line {}",
                    operand, line_nr
                )))
            }
        };

        let reg: RegisterType = match captures[1].parse() {
            Ok(reg) => reg,
            Err(_) => {
                return Err(LoadError::ParseError(format!(
                    "Invalid register '{}' at line {}",
                    operand, line_nr
                )))
            }
        };

        if reg >= ARCH_REG_COUNT {
            return Err(LoadError::ParseError(format!(
                "Register '{}' out of range (R0..R{}) at line {}",
                operand,
                ARCH_REG_COUNT - 1,
                line_nr
            )));
        }

        Ok(reg)
    }

    fn parse_number(&self, operand: &str, line_nr: usize) -> Result<WordType, LoadError> {
        if !self.num_pattern.is_match(operand) {
            return Err(LoadError::ParseError(format!(
                "Expected a number but found '{}' at line {}",
                operand, line_nr
            )));
        }

        operand.parse().map_err(|_| {
            LoadError::ParseError(format!("Invalid number '{}' at line {}", operand, line_nr))
        })
    }

    // Second pass: branch targets must name an existing instruction.
    fn analyze(&self) -> Result<(), LoadError> {
        let mut errors = Vec::new();

        for instr in &self.code {
            if let Some(target) = instr.target {
                if target >= self.code.len() {
                    errors.push(format!(
                        "Branch at instruction {} targets {}, but the program has only {} instructions",
                        instr.id,
                        target,
                        self.code.len()
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LoadError::AnalysisError(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_formats() {
        let program = load_from_string(
            r#"
; a small program exercising every operand shape
LD R1, 100
ST R2, 104
ADD R3, R1, R2
MUL R4, R3, R3
BEQ R1, R2, 0
"#,
        )
        .unwrap();

        assert_eq!(program.len(), 5);
        assert_eq!(program.code[0].opcode, Opcode::LD);
        assert_eq!(program.code[0].dest, Some(1));
        assert_eq!(program.code[0].address, Some(100));
        assert_eq!(program.code[1].src1, Some(2));
        assert_eq!(program.code[2].src2, Some(2));
        assert_eq!(program.code[4].target, Some(0));
    }

    #[test]
    fn test_unknown_operation() {
        let result = load_from_string("FOO R1, R2, R3");
        assert!(matches!(result, Err(LoadError::ParseError(_))));
    }

    #[test]
    fn test_wrong_operand_count() {
        let result = load_from_string("ADD R1, R2");
        assert!(matches!(result, Err(LoadError::ParseError(_))));
    }

    #[test]
    fn test_register_out_of_range() {
        let result = load_from_string("ADD R8, R1, R2");
        assert!(matches!(result, Err(LoadError::ParseError(_))));
    }

    #[test]
    fn test_branch_target_out_of_range() {
        let result = load_from_string("BEQ R1, R2, 7");
        assert!(matches!(result, Err(LoadError::AnalysisError(_))));
    }
}
