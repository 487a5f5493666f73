//! The 32-bit x86 assembly listing builder.
//!
//! An append-only builder with two segments plus a scratch buffer:
//!
//! - `data` collects one `<label> <directive> <value>` line per global;
//! - `text` collects function labels and instructions;
//! - `code` collects the body of the function currently being compiled,
//!   and is spliced into `text` between the prologue and the epilogue by
//!   [Asm::insert_function_code].
//!
//! [Asm::finish] joins the segments with the fixed FASM boilerplate: the
//! PE header, the startup stub that calls `_main` and hands its result to
//! `ExitProcess`, the `scanf`/`printf` wrappers behind the `_read` and
//! `_write` intrinsics, and the import directory.
//!
//! # Operand formatting
//!
//! [operand] renders a [Value] the way an instruction names it: literals
//! as plain decimals, registers by their name at the value's current
//! width, and memory symbols as `<width> [symbol+offset]`.  A symbol of
//! function-pointer type renders as the bare label, which is what `call`
//! wants.

use crate::common::Id;

use super::regs::Registers;
use super::types::{Type, Width};
use super::value::Value;

/// Mangle a source name into an assembly symbol.  The prefix keeps user
/// identifiers clear of the assembler's reserved words.
pub fn mangle(name: Id) -> Id {
    crate::common::id(&format!("_{name}"))
}

/// Render a value as an instruction operand.
pub fn operand(value: &Value, regs: &Registers) -> String {
    match value {
        Value::Integer { literal, .. } => literal.to_string(),
        Value::Register { ty, allocation } => regs.resolve(*allocation).name(ty.width()).to_string(),
        Value::Symbol {
            ty: Type::Function(_),
            symbol,
            ..
        } => symbol.to_string(),
        Value::Symbol {
            ty: Type::Int(ty),
            symbol,
            offset,
        } => {
            if *offset == 0 {
                format!("{} [{}]", ty.width(), symbol)
            } else if *offset > 0 {
                format!("{} [{}+{}]", ty.width(), symbol, offset)
            } else {
                format!("{} [{}{}]", ty.width(), symbol, offset)
            }
        }
    }
}

const HEADER: &str = "\
format PE console
entry start

include 'win32a.inc'
";

/// The `printf`/`scanf` format strings every program carries.
const DATA_FORMATS: &str = "\
  scanf_format db \"%d\", 0
  printf_format db \"%d\", 10, 0
";

/// Entry point: run `main`, exit with its result.
const START_STUB: &str = "\
start:
  call _main
  push eax
  call [ExitProcess]
";

/// The intrinsic wrappers over the C runtime.  `_read` scans one decimal
/// integer into a stack slot and returns it; `_write` prints its one
/// cdecl argument followed by a newline.
const RUNTIME: &str = "\
_read:
  push ebp
  mov ebp, esp
  sub esp, 4
  lea eax, [ebp-4]
  push eax
  push scanf_format
  call [scanf]
  add esp, 8
  mov eax, dword [ebp-4]
  leave
  ret

_write:
  push ebp
  mov ebp, esp
  push dword [ebp+8]
  push printf_format
  call [printf]
  add esp, 8
  leave
  ret
";

const FOOTER: &str = "\
section '.idata' import data readable
  library kernel32, 'KERNEL32.DLL', msvcrt, 'MSVCRT.DLL'
  import kernel32, ExitProcess, 'ExitProcess'
  import msvcrt, scanf, 'scanf', printf, 'printf'
";

#[derive(Default)]
pub struct Asm {
    data: String,
    text: String,
    code: String,
}

impl Asm {
    pub fn new() -> Self {
        Asm::default()
    }

    /// One data-segment definition, e.g. `_a dd 42`.
    pub fn data_line(&mut self, label: Id, width: Width, value: &str) {
        self.data.push_str("  ");
        self.data.push_str(&label);
        self.data.push(' ');
        self.data.push_str(width.directive());
        self.data.push(' ');
        self.data.push_str(value);
        self.data.push('\n');
    }

    /// A label line in the text segment.
    pub fn text_label(&mut self, label: &str) {
        self.text.push_str(label);
        self.text.push_str(":\n");
    }

    /// An instruction line in the text segment (prologue/epilogue).
    pub fn text_line(&mut self, insn: &str) {
        self.text.push_str("  ");
        self.text.push_str(insn);
        self.text.push('\n');
    }

    /// A blank separator line in the text segment.
    pub fn text_blank(&mut self) {
        self.text.push('\n');
    }

    /// An instruction line in the current function's scratch buffer.
    pub fn code_line(&mut self, insn: &str) {
        self.code.push_str("  ");
        self.code.push_str(insn);
        self.code.push('\n');
    }

    pub fn clear_code(&mut self) {
        self.code.clear();
    }

    /// Splice the scratch buffer into the text segment, between the
    /// already-emitted prologue and the epilogue about to follow.
    pub fn insert_function_code(&mut self) {
        self.text.push_str(&self.code);
        self.code.clear();
    }

    /// Join the segments into the final listing.
    pub fn finish(self) -> String {
        let mut listing = String::new();
        listing.push_str(HEADER);
        listing.push_str("\nsection '.data' data readable writeable\n");
        listing.push_str(&self.data);
        listing.push_str(DATA_FORMATS);
        listing.push_str("\nsection '.text' code readable executable\n");
        listing.push_str(START_STUB);
        listing.push('\n');
        listing.push_str(&self.text);
        listing.push_str(RUNTIME);
        listing.push('\n');
        listing.push_str(FOOTER);
        listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back::types::{IntType, I16, I32, U8};
    use crate::common::{id, Location};

    fn loc() -> Location {
        Location::new(id("test.mc"), 0, 0)
    }

    fn symbol(ty: IntType, name: &str, offset: i32) -> Value {
        Value::Symbol {
            ty: Type::Int(ty),
            symbol: id(name),
            offset,
        }
    }

    #[test]
    fn formats_integer_operands() {
        let regs = Registers::new();
        let value = Value::Integer {
            ty: Some(I32),
            literal: -7,
        };
        assert_eq!(operand(&value, &regs), "-7");
    }

    #[test]
    fn formats_memory_operands_with_width_and_offset() {
        let regs = Registers::new();
        assert_eq!(operand(&symbol(I32, "_a", 0), &regs), "dword [_a]");
        assert_eq!(operand(&symbol(I32, "ebp", 8), &regs), "dword [ebp+8]");
        assert_eq!(operand(&symbol(U8, "ebp", -4), &regs), "byte [ebp-4]");
        assert_eq!(operand(&symbol(I16, "esp", 4), &regs), "word [esp+4]");
    }

    #[test]
    fn formats_function_symbols_as_bare_labels() {
        let regs = Registers::new();
        let callee = Value::Symbol {
            ty: Type::Function(0),
            symbol: id("_sum"),
            offset: 0,
        };
        assert_eq!(operand(&callee, &regs), "_sum");
    }

    #[test]
    fn register_operands_follow_the_value_width() {
        let mut regs = Registers::new();
        let value = regs.allocate(I32, loc()).unwrap();
        assert_eq!(operand(&value, &regs), "eax");
        let narrowed = value.retyped(U8);
        assert_eq!(operand(&narrowed, &regs), "al");
    }

    #[test]
    fn splices_code_between_prologue_and_epilogue() {
        let mut asm = Asm::new();
        asm.code_line("add eax, 2");
        asm.text_label("_main");
        asm.text_line("push ebp");
        asm.insert_function_code();
        asm.text_line("ret");
        let listing = asm.finish();
        let body = [
            "_main:",
            "  push ebp",
            "  add eax, 2",
            "  ret",
        ]
        .join("\n");
        assert!(listing.contains(&body), "bad splice order:\n{listing}");
    }

    #[test]
    fn listing_carries_the_fixed_boilerplate() {
        let mut asm = Asm::new();
        asm.data_line(id("_a"), Width::Dword, "42");
        let listing = asm.finish();
        for piece in [
            "format PE console",
            "entry start",
            "include 'win32a.inc'",
            "section '.data' data readable writeable",
            "  _a dd 42",
            "scanf_format db \"%d\", 0",
            "printf_format db \"%d\", 10, 0",
            "section '.text' code readable executable",
            "start:",
            "  call _main",
            "  call [ExitProcess]",
            "_read:",
            "_write:",
            "section '.idata' import data readable",
            "import msvcrt, scanf, 'scanf', printf, 'printf'",
        ] {
            assert!(listing.contains(piece), "missing {piece:?} in:\n{listing}");
        }
    }

    #[test]
    fn mangles_with_an_underscore() {
        assert_eq!(mangle(id("main")), id("_main"));
    }
}
