//! The code generator.
//!
//! Compilation runs in two phases over the parsed declarations:
//!
//! 1. *Registration* walks the top level and builds the symbol tables:
//!    globals with their folded initializers, functions with their
//!    signatures and bodies.  The `_read` and `_write` intrinsics are
//!    pre-registered so calls to them resolve like any other.
//! 2. *Generation* walks each user function's body, emitting instructions
//!    into a scratch buffer that is spliced between the prologue and
//!    epilogue once the function's ever-used register set is known.
//!
//! Expression compilation is template-style: every subexpression yields a
//! [Value] naming where its result lives, and moves and casts between
//! values perform the implicit and explicit integer conversions.  The
//! calling convention is cdecl with a pre-subtracted argument frame, so
//! arguments are stored left-to-right into `[esp+4*i]` slots.

use tracing::{debug, trace};

use crate::common::{id, ErrorKind, Id, Location, Map, Result};
use crate::front::ast::{ArgDecl, BinOp, Decl, Expr, Program, Stmt, TypeExpr};
use crate::front::parse;
use crate::middle::fold_expr;

use super::asm::{mangle, operand, Asm};
use super::regs::{Register, Registers, RETURN_REGISTER};
use super::types::{self, IntType, Type};
use super::value::Value;

/// Compile one source unit into an assembly listing.
pub fn compile(source: &str, file_name: &str) -> Result<String> {
    let program = parse(source, file_name)?;
    Codegen::new().run(&program)
}

/// A registered global variable.
struct Global {
    symbol: Id,
    ty: IntType,
    /// The folded initializer, rendered as the data directive's operand.
    value_text: String,
}

/// A registered function.  Intrinsics carry no body; their assembly is
/// part of the fixed listing boilerplate.
struct Function<'a> {
    location: Location,
    symbol: Id,
    return_ty: Option<IntType>,
    args: Vec<Arg>,
    body: Option<&'a [Stmt]>,
}

struct Arg {
    ty: IntType,
    name: Id,
}

pub struct Codegen<'a> {
    asm: Asm,
    regs: Registers,
    globals: Vec<Global>,
    functions: Vec<Function<'a>>,
    /// Source name to table index, for symbol lookup.  Iteration order of
    /// the tables themselves is insertion order.
    global_names: Map<Id, usize>,
    function_names: Map<Id, usize>,
    /// The function currently being generated.
    current: Option<usize>,
    /// Set when a non-final `return` jumps to the function's ending label.
    needs_end_label: bool,
}

impl<'a> Codegen<'a> {
    pub fn new() -> Self {
        let mut gen = Codegen {
            asm: Asm::new(),
            regs: Registers::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            global_names: Map::new(),
            function_names: Map::new(),
            current: None,
            needs_end_label: false,
        };
        let builtin = Location::new(id("<intrinsic>"), 0, 0);
        gen.add_function(
            id("read"),
            Function {
                location: builtin,
                symbol: id("_read"),
                return_ty: Some(types::I32),
                args: Vec::new(),
                body: None,
            },
        );
        gen.add_function(
            id("write"),
            Function {
                location: builtin,
                symbol: id("_write"),
                return_ty: None,
                args: vec![Arg {
                    ty: types::I32,
                    name: id("value"),
                }],
                body: None,
            },
        );
        gen
    }

    fn add_function(&mut self, name: Id, function: Function<'a>) {
        self.function_names.insert(name, self.functions.len());
        self.functions.push(function);
    }

    /// Run both phases and produce the listing.
    pub fn run(mut self, program: &'a Program) -> Result<String> {
        for decl in &program.decls {
            self.register_declaration(decl)?;
        }
        debug!(
            globals = self.globals.len(),
            functions = self.functions.len(),
            "registered declarations"
        );

        for global in &self.globals {
            self.asm
                .data_line(global.symbol, global.ty.width(), &global.value_text);
        }
        for index in 0..self.functions.len() {
            self.compile_function(index)?;
        }
        Ok(self.asm.finish())
    }

    // ------------------------------------------------------------------
    // Phase 1: registration
    // ------------------------------------------------------------------

    fn register_declaration(&mut self, decl: &'a Decl) -> Result<()> {
        match decl {
            Decl::Variable {
                ty,
                name,
                initializer,
                location,
            } => self.register_variable(ty.as_ref(), *name, initializer, *location),
            Decl::Function {
                return_ty,
                name,
                args,
                body,
                location,
            } => self.register_function(return_ty.as_ref(), *name, args, body, *location),
        }
    }

    fn check_duplicate(&self, name: Id, location: Location) -> Result<()> {
        if self.global_names.contains_key(&name) || self.function_names.contains_key(&name) {
            return Err(ErrorKind::DuplicateSymbol(mangle(name)).at(location));
        }
        Ok(())
    }

    fn register_variable(
        &mut self,
        ty: Option<&TypeExpr>,
        name: Id,
        initializer: &Expr,
        location: Location,
    ) -> Result<()> {
        let Some(ty) = ty else {
            // The grammar admits `name = expr;`, but without inference
            // there is nothing to give the variable a type.
            return Err(ErrorKind::UnexpectedSyntaxNode("a variable type".to_string()).at(location));
        };
        let ty = self.resolve_type(ty)?;
        self.check_duplicate(name, location)?;

        let literal = self.constant_initializer(initializer, ty)?;
        trace!(symbol = %mangle(name), at = %location, "registered global variable");
        self.global_names.insert(name, self.globals.len());
        self.globals.push(Global {
            symbol: mangle(name),
            ty,
            value_text: literal.to_string(),
        });
        Ok(())
    }

    /// Fold a global initializer down to a literal of the variable's type.
    fn constant_initializer(&self, initializer: &Expr, ty: IntType) -> Result<i64> {
        let value = match fold_expr(initializer.clone())? {
            Expr::Integer { value, location } => {
                convert_integer(value, ty, false, location)?
            }
            // An explicit cast makes a lossy initializer deliberate:
            // `u8 a = 300 : u8;` stores the masked value.
            Expr::TypeCast {
                inner,
                target,
                location,
            } => {
                let target_ty = self.resolve_type(&target)?;
                let Expr::Integer { value, .. } = *inner else {
                    return Err(ErrorKind::UnexpectedSyntaxNode(
                        "a constant initializer".to_string(),
                    )
                    .at(location));
                };
                let cast = convert_integer(value, target_ty, true, location)?;
                let Value::Integer { literal, .. } = cast else {
                    unreachable!("convert_integer always yields a literal");
                };
                convert_integer(literal, ty, false, location)?
            }
            other => {
                return Err(
                    ErrorKind::UnexpectedSyntaxNode("a constant initializer".to_string())
                        .at(other.location()),
                )
            }
        };
        match value {
            Value::Integer { literal, .. } => Ok(literal),
            _ => unreachable!("convert_integer always yields a literal"),
        }
    }

    fn register_function(
        &mut self,
        return_ty: Option<&TypeExpr>,
        name: Id,
        args: &[ArgDecl],
        body: &'a [Stmt],
        location: Location,
    ) -> Result<()> {
        self.check_duplicate(name, location)?;
        let return_ty = return_ty.map(|ty| self.resolve_type(ty)).transpose()?;
        let args = args
            .iter()
            .map(|arg| {
                Ok(Arg {
                    ty: self.resolve_type(&arg.ty)?,
                    name: arg.name,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        trace!(symbol = %mangle(name), at = %location, "registered function");
        self.add_function(
            name,
            Function {
                location,
                symbol: mangle(name),
                return_ty,
                args,
                body: Some(body),
            },
        );
        Ok(())
    }

    fn resolve_type(&self, ty: &TypeExpr) -> Result<IntType> {
        types::find(&ty.name).ok_or_else(|| ErrorKind::UnknownIdentifier(ty.name).at(ty.location))
    }

    // ------------------------------------------------------------------
    // Phase 2: generation
    // ------------------------------------------------------------------

    fn current_function(&self) -> &Function<'a> {
        match self.current {
            Some(index) => &self.functions[index],
            None => unreachable!("statements are only compiled inside a function"),
        }
    }

    fn emit(&mut self, insn: String) {
        self.asm.code_line(&insn);
    }

    fn compile_function(&mut self, index: usize) -> Result<()> {
        let Some(body) = self.functions[index].body else {
            return Ok(());
        };
        let symbol = self.functions[index].symbol;
        trace!(%symbol, at = %self.functions[index].location, "compiling function");

        self.current = Some(index);
        self.asm.clear_code();
        self.regs.reset_used();
        self.needs_end_label = false;

        for (position, stmt) in body.iter().enumerate() {
            self.compile_statement(stmt, position + 1 == body.len())?;
        }
        debug_assert_eq!(
            self.regs.live_count(),
            0,
            "register leaked while compiling {symbol}"
        );

        // The return register is never callee-saved on cdecl; a result
        // left in eax must survive the epilogue.
        let saved: Vec<Register> = self
            .regs
            .used()
            .filter(|register| *register != RETURN_REGISTER)
            .collect();
        self.asm.text_label(&symbol);
        self.asm.text_line("push ebp");
        self.asm.text_line("mov ebp, esp");
        for register in &saved {
            self.asm.text_line(&format!("push {register}"));
        }
        self.asm.insert_function_code();
        if self.needs_end_label {
            self.asm.text_label(&format!("end{symbol}"));
        }
        for register in saved.iter().rev() {
            self.asm.text_line(&format!("pop {register}"));
        }
        self.asm.text_line("leave");
        self.asm.text_line("ret");
        self.asm.text_blank();

        self.current = None;
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Stmt, is_last: bool) -> Result<()> {
        match stmt {
            Stmt::Assign { lhs, rhs, .. } => {
                let dst = self.compile_value(lhs, None)?;
                if !matches!(dst, Value::Symbol { ty: Type::Int(_), .. }) {
                    return Err(ErrorKind::NotLValue.at(lhs.location()));
                }
                self.generate_assignment(dst, rhs)
            }
            Stmt::Return { value, location } => {
                self.compile_return(value.as_ref(), *location, is_last)
            }
            Stmt::Call(expr) => {
                self.compile_call(expr, false)?;
                Ok(())
            }
        }
    }

    fn compile_return(
        &mut self,
        value: Option<&Expr>,
        location: Location,
        is_last: bool,
    ) -> Result<()> {
        let return_ty = self.current_function().return_ty;
        match (value, return_ty) {
            (Some(expr), Some(ty)) => {
                let folded = fold_expr(expr.clone())?;
                let value = self.compile_value(&folded, Some(ty))?;
                // Free first: if the result already sits in the return
                // register, requiring it below needs no displacement and
                // the move elides.
                self.regs.free(&value);
                let (ret, displaced) = self.regs.get_return_register(ty, location)?;
                if let Some((new, old)) = displaced {
                    self.emit(format!("mov {new}, {old}"));
                }
                self.generate_mov(&ret, value, false, location)?;
                self.regs.free(&ret);
            }
            (None, None) => {}
            _ => return Err(ErrorKind::MismatchingReturn.at(location)),
        }
        if !is_last {
            let symbol = self.current_function().symbol;
            self.emit(format!("jmp end{symbol}"));
            self.needs_end_label = true;
        }
        Ok(())
    }

    /// Store the right-hand side into a strongly typed destination.
    fn generate_assignment(&mut self, dst: Value, rhs: &Expr) -> Result<()> {
        let location = rhs.location();
        let rhs = fold_expr(rhs.clone())?;

        // A cast to the destination's own type marks a deliberate
        // narrowing of a computed value: compile the inner expression
        // untargeted and move it explicitly.
        if let Expr::TypeCast { inner, target, .. } = &rhs {
            let target_ty = self.resolve_type(target)?;
            if dst.int_type() == Some(target_ty) {
                let value = self.compile_value(inner, None)?;
                return self.generate_mov(&dst, value, true, location);
            }
        }

        let value = self.compile_value(&rhs, dst.int_type())?;
        self.generate_mov(&dst, value, false, location)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Compile an expression, returning where its result lives.  Any
    /// register the value owns stays live until the caller frees it.
    fn compile_value(&mut self, expr: &Expr, target: Option<IntType>) -> Result<Value> {
        match expr {
            Expr::Identifier { name, location } => self.find_symbol(*name, *location),
            Expr::Integer { value, location } => match target {
                Some(ty) => convert_integer(*value, ty, false, *location),
                None => Ok(Value::Integer {
                    ty: None,
                    literal: *value,
                }),
            },
            Expr::TypeCast {
                inner,
                target: cast_ty,
                location,
            } => {
                let ty = self.resolve_type(cast_ty)?;
                let inner = self.compile_value(inner, Some(ty))?;
                self.generate_type_cast(inner, ty, true, *location)
            }
            Expr::Negation { inner, location } => {
                let value = self.compile_value(inner, target)?;
                if let Some(ty) = value.int_type() {
                    if !ty.signed {
                        return Err(ErrorKind::UnsignedType.at(*location));
                    }
                }
                let value = self.into_register(value, target, *location)?;
                self.emit(format!("neg {}", operand(&value, &self.regs)));
                Ok(value)
            }
            Expr::Binary { .. } => self.compile_binary(expr, target),
            Expr::Call { .. } => match self.compile_call(expr, true)? {
                Some(value) => Ok(value),
                None => unreachable!("calls compiled for their value always produce one"),
            },
        }
    }

    /// Materialize a value into a register if it is not in one already.
    fn into_register(
        &mut self,
        value: Value,
        target: Option<IntType>,
        location: Location,
    ) -> Result<Value> {
        if matches!(value, Value::Register { .. }) {
            return Ok(value);
        }
        let ty = value.int_type().or(target).ok_or_else(|| {
            ErrorKind::NotImplemented("arithmetic on a value of unknown type".to_string())
                .at(location)
        })?;
        let register = self.regs.allocate(ty, location)?;
        self.generate_mov(&register, value, false, location)?;
        Ok(register)
    }

    fn compile_binary(&mut self, expr: &Expr, target: Option<IntType>) -> Result<Value> {
        let Expr::Binary {
            op,
            left,
            right,
            location,
        } = expr
        else {
            unreachable!("compile_binary is only handed binary expressions");
        };

        let result_ty = self.evaluate_type(expr)?.and_then(Type::as_int).or(target);
        let mut lhs = self.compile_value(left, result_ty)?;
        let mut rhs = self.compile_value(right, result_ty)?;

        if let (Some(lt), Some(rt)) = (lhs.int_type(), rhs.int_type()) {
            if lt.signed != rt.signed {
                return Err(ErrorKind::InvalidTypeCast(
                    "cannot change type's signedness".to_string(),
                )
                .at(*location));
            }
        }

        // The left operand carries the result, so it must be a register.
        // Addition is commutative, which saves a move when only the right
        // operand already is one.
        if !matches!(lhs, Value::Register { .. }) {
            if *op == BinOp::Add && matches!(rhs, Value::Register { .. }) {
                std::mem::swap(&mut lhs, &mut rhs);
            } else {
                lhs = self.into_register(lhs, result_ty, *location)?;
            }
        }

        let rhs = match result_ty {
            Some(ty) => self.generate_type_cast(rhs, ty, false, *location)?,
            None => rhs,
        };

        let insn = match op {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul | BinOp::Div => {
                return Err(ErrorKind::NotImplemented(format!(
                    "code generation for the `{op}` operator"
                ))
                .at(*location));
            }
        };
        self.emit(format!(
            "{insn} {}, {}",
            operand(&lhs, &self.regs),
            operand(&rhs, &self.regs)
        ));
        self.regs.free(&rhs);
        Ok(lhs)
    }

    /// Compile a call.  `want_result` distinguishes expression context,
    /// which claims the return register, from statement context, which
    /// discards the result.
    fn compile_call(&mut self, expr: &Expr, want_result: bool) -> Result<Option<Value>> {
        let Expr::Call {
            callee,
            args,
            location,
        } = expr
        else {
            unreachable!("compile_call is only handed call expressions");
        };

        let callee_value = self.compile_value(callee, None)?;
        let Value::Symbol {
            ty: Type::Function(index),
            symbol,
            ..
        } = callee_value
        else {
            return Err(ErrorKind::NotCallableType.at(callee.location()));
        };

        let param_tys: Vec<IntType> = self.functions[index].args.iter().map(|a| a.ty).collect();
        let return_ty = self.functions[index].return_ty;
        if args.len() != param_tys.len() {
            return Err(ErrorKind::UnexpectedSyntaxNode(format!(
                "{} argument(s) in the call to `{symbol}`",
                param_tys.len()
            ))
            .at(*location));
        }

        // cdecl with a pre-subtracted frame: the stack space for all
        // arguments is claimed up front, then each argument is stored
        // into its slot in evaluation order.
        let stack_bytes = 4 * args.len();
        if stack_bytes > 0 {
            self.emit(format!("sub esp, {stack_bytes}"));
        }
        for (position, (arg, ty)) in args.iter().zip(&param_tys).enumerate() {
            let slot = Value::Symbol {
                ty: Type::Int(*ty),
                symbol: id("esp"),
                offset: 4 * position as i32,
            };
            self.generate_assignment(slot, arg)?;
        }

        let result = if want_result {
            let Some(ty) = return_ty else {
                return Err(ErrorKind::NoReturnValue(symbol).at(*location));
            };
            let (value, displaced) = self.regs.get_return_register(ty, *location)?;
            if let Some((new, old)) = displaced {
                self.emit(format!("mov {new}, {old}"));
            }
            Some(value)
        } else {
            None
        };

        self.emit(format!("call {symbol}"));
        if stack_bytes > 0 {
            self.emit(format!("add esp, {stack_bytes}"));
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Symbols and types
    // ------------------------------------------------------------------

    /// Resolve an identifier inside the current function: parameters
    /// shadow globals, globals shadow functions.
    fn find_symbol(&self, name: Id, location: Location) -> Result<Value> {
        if let Some(index) = self.current {
            let args = &self.functions[index].args;
            if let Some(position) = args.iter().position(|arg| arg.name == name) {
                // [ebp] holds the saved frame pointer and [ebp+4] the
                // return address; arguments start at [ebp+8].
                return Ok(Value::Symbol {
                    ty: Type::Int(args[position].ty),
                    symbol: id("ebp"),
                    offset: ((position + 2) * 4) as i32,
                });
            }
        }
        if let Some(&index) = self.global_names.get(&name) {
            let global = &self.globals[index];
            return Ok(Value::Symbol {
                ty: Type::Int(global.ty),
                symbol: global.symbol,
                offset: 0,
            });
        }
        if let Some(&index) = self.function_names.get(&name) {
            return Ok(Value::Symbol {
                ty: Type::Function(index),
                symbol: self.functions[index].symbol,
                offset: 0,
            });
        }
        Err(ErrorKind::UnknownIdentifier(name).at(location))
    }

    /// The static type of an expression, without emitting any code.
    /// `None` means the type is still unresolved (an untyped literal).
    fn evaluate_type(&self, expr: &Expr) -> Result<Option<Type>> {
        match expr {
            Expr::Integer { .. } => Ok(None),
            Expr::Identifier { name, location } => {
                let value = self.find_symbol(*name, *location)?;
                Ok(value.ty())
            }
            Expr::TypeCast { target, .. } => Ok(Some(Type::Int(self.resolve_type(target)?))),
            Expr::Negation { inner, location } => match self.evaluate_type(inner)? {
                Some(Type::Int(ty)) if !ty.signed => Err(ErrorKind::UnsignedType.at(*location)),
                Some(Type::Function(_)) => Err(ErrorKind::UnexpectedSyntaxNode(
                    "an integer expression".to_string(),
                )
                .at(inner.location())),
                ty => Ok(ty),
            },
            Expr::Binary {
                left,
                right,
                location,
                ..
            } => {
                let lt = self.operand_type(left)?;
                let rt = self.operand_type(right)?;
                match (lt, rt) {
                    (Some(a), Some(b)) => {
                        if a.signed != b.signed {
                            return Err(ErrorKind::InvalidTypeCast(
                                "cannot change type's signedness".to_string(),
                            )
                            .at(*location));
                        }
                        let wider = if a.size >= b.size { a } else { b };
                        Ok(Some(Type::Int(wider)))
                    }
                    (Some(ty), None) | (None, Some(ty)) => Ok(Some(Type::Int(ty))),
                    (None, None) => Ok(None),
                }
            }
            Expr::Call { callee, .. } => match self.evaluate_type(callee)? {
                Some(Type::Function(index)) => {
                    Ok(self.functions[index].return_ty.map(Type::Int))
                }
                _ => Err(ErrorKind::NotCallableType.at(callee.location())),
            },
        }
    }

    /// Like [Codegen::evaluate_type], but rejects function-typed
    /// operands, which cannot take part in arithmetic.
    fn operand_type(&self, expr: &Expr) -> Result<Option<IntType>> {
        match self.evaluate_type(expr)? {
            Some(Type::Function(_)) => Err(ErrorKind::UnexpectedSyntaxNode(
                "an integer expression".to_string(),
            )
            .at(expr.location())),
            Some(Type::Int(ty)) => Ok(Some(ty)),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Moves and casts
    // ------------------------------------------------------------------

    /// Do the values name the same storage?  Symbols alias on equal
    /// `(symbol, offset)`, registers on resolving to the same register,
    /// whatever their widths.
    fn same_location(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (
                Value::Symbol {
                    symbol: s1,
                    offset: o1,
                    ..
                },
                Value::Symbol {
                    symbol: s2,
                    offset: o2,
                    ..
                },
            ) => s1 == s2 && o1 == o2,
            (
                Value::Register {
                    allocation: a1, ..
                },
                Value::Register {
                    allocation: a2, ..
                },
            ) => self.regs.resolve(*a1) == self.regs.resolve(*a2),
            _ => false,
        }
    }

    /// Reinterpret a value at another width in place, which for registers
    /// is only possible when the register has a name at that width.
    fn reinterpret(&self, value: Value, ty: IntType, location: Location) -> Result<Value> {
        if let Value::Register { allocation, .. } = &value {
            let register = self.regs.resolve(*allocation);
            if !register.has_width(ty.width()) {
                return Err(ErrorKind::InvalidTypeCast(format!(
                    "register {register} is not addressable as {}",
                    ty.width()
                ))
                .at(location));
            }
        }
        Ok(value.retyped(ty))
    }

    /// Move `src` into the strongly typed destination, converting as
    /// needed.  Consumes (frees) the source.
    fn generate_mov(
        &mut self,
        dst: &Value,
        src: Value,
        explicit: bool,
        location: Location,
    ) -> Result<()> {
        let Some(dst_ty) = dst.int_type() else {
            return Err(
                ErrorKind::UnexpectedSyntaxNode("an integer destination".to_string()).at(location),
            );
        };

        // Literals are converted to the destination's type and stored in
        // one instruction.
        if let Value::Integer { literal, .. } = src {
            let converted = convert_integer(literal, dst_ty, explicit, location)?;
            self.emit(format!(
                "mov {}, {}",
                operand(dst, &self.regs),
                operand(&converted, &self.regs)
            ));
            return Ok(());
        }

        let Some(src_ty) = src.int_type() else {
            return Err(
                ErrorKind::UnexpectedSyntaxNode("an integer value".to_string()).at(location),
            );
        };
        if !explicit {
            if src_ty.signed != dst_ty.signed {
                return Err(ErrorKind::InvalidTypeCast(
                    "cannot change type's signedness".to_string(),
                )
                .at(location));
            }
            if dst_ty.size < src_ty.size {
                return Err(
                    ErrorKind::InvalidTypeCast("possible value loss".to_string()).at(location)
                );
            }
        }

        if self.same_location(dst, &src) {
            self.regs.free(&src);
            return Ok(());
        }

        // No memory-to-memory moves on x86: route through a scratch
        // register of the source's type.
        if matches!(src, Value::Symbol { .. }) && matches!(dst, Value::Symbol { .. }) {
            let scratch = self.regs.allocate(src_ty, location)?;
            self.emit(format!(
                "mov {}, {}",
                operand(&scratch, &self.regs),
                operand(&src, &self.regs)
            ));
            return self.generate_mov(dst, scratch, explicit, location);
        }

        use std::cmp::Ordering;
        match dst_ty.size.cmp(&src_ty.size) {
            Ordering::Equal => {
                self.emit(format!(
                    "mov {}, {}",
                    operand(dst, &self.regs),
                    operand(&src, &self.regs)
                ));
            }
            Ordering::Greater => {
                let insn = if src_ty.signed { "movsx" } else { "movzx" };
                self.emit(format!(
                    "{insn} {}, {}",
                    operand(dst, &self.regs),
                    operand(&src, &self.regs)
                ));
            }
            Ordering::Less => {
                let narrowed = self.reinterpret(src.clone(), dst_ty, location)?;
                self.emit(format!(
                    "mov {}, {}",
                    operand(dst, &self.regs),
                    operand(&narrowed, &self.regs)
                ));
            }
        }
        self.regs.free(&src);
        Ok(())
    }

    /// Produce a value of `target` type from `value`, emitting widening
    /// code where the machine needs it.
    fn generate_type_cast(
        &mut self,
        value: Value,
        target: IntType,
        explicit: bool,
        location: Location,
    ) -> Result<Value> {
        if value.ty() == Some(Type::Int(target)) {
            return Ok(value);
        }
        if let Value::Integer { literal, .. } = value {
            return convert_integer(literal, target, explicit, location);
        }
        let Some(src_ty) = value.int_type() else {
            return Err(
                ErrorKind::InvalidTypeCast("cannot cast a function".to_string()).at(location)
            );
        };
        if src_ty.signed != target.signed && !explicit {
            return Err(ErrorKind::InvalidTypeCast(
                "cannot change type's signedness".to_string(),
            )
            .at(location));
        }

        use std::cmp::Ordering;
        match target.size.cmp(&src_ty.size) {
            // Same size: only the signedness differs, reinterpret.
            Ordering::Equal => Ok(value.retyped(target)),
            Ordering::Less => {
                if !explicit {
                    return Err(
                        ErrorKind::InvalidTypeCast("possible value loss".to_string()).at(location)
                    );
                }
                // Narrowing aliases the low bytes; no instruction needed.
                self.reinterpret(value, target, location)
            }
            Ordering::Greater => match value {
                Value::Register { allocation, .. } => {
                    let register = self.regs.resolve(allocation);
                    if src_ty.signed {
                        self.emit(format!(
                            "movsx {}, {}",
                            register.name(target.width()),
                            register.name(src_ty.width())
                        ));
                    } else {
                        // Zero-extend in place by masking off the high bits.
                        self.emit(format!(
                            "and {}, {}",
                            register.name(target.width()),
                            src_ty.mask()
                        ));
                    }
                    Ok(Value::Register {
                        ty: target,
                        allocation,
                    })
                }
                Value::Symbol { .. } => {
                    let insn = if src_ty.signed { "movsx" } else { "movzx" };
                    let register = self.regs.allocate(target, location)?;
                    self.emit(format!(
                        "{insn} {}, {}",
                        operand(&register, &self.regs),
                        operand(&value, &self.regs)
                    ));
                    Ok(register)
                }
                Value::Integer { .. } => unreachable!("literals are converted above"),
            },
        }
    }
}

impl Default for Codegen<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Adjust an integer literal to a target type.
///
/// A negative literal can never become unsigned, however explicit the
/// cast.  Out-of-range literals are a loss of value unless the cast is
/// explicit, in which case they are masked to the target's bits and
/// re-signed when the target is signed.
pub(crate) fn convert_integer(
    literal: i64,
    target: IntType,
    explicit: bool,
    location: Location,
) -> Result<Value> {
    if literal < 0 && !target.signed {
        return Err(
            ErrorKind::InvalidTypeCast("cannot change type's signedness".to_string()).at(location),
        );
    }
    let literal = if literal < target.min() || literal > target.max() {
        if !explicit {
            return Err(ErrorKind::InvalidTypeCast("possible value loss".to_string()).at(location));
        }
        let masked = literal & target.mask();
        if target.signed && masked > target.max() {
            masked - 2 * target.max() - 2
        } else {
            masked
        }
    } else {
        literal
    };
    Ok(Value::Integer {
        ty: Some(target),
        literal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back::types::{I16, I32, I8, U32, U8};

    fn loc() -> Location {
        Location::new(id("test.mc"), 0, 0)
    }

    fn converted(literal: i64, target: IntType, explicit: bool) -> Result<i64> {
        convert_integer(literal, target, explicit, loc()).map(|value| match value {
            Value::Integer {
                literal,
                ty: Some(ty),
            } => {
                assert_eq!(ty, target);
                literal
            }
            other => panic!("expected a typed literal, got {other:?}"),
        })
    }

    #[test]
    fn in_range_literals_pass_through() {
        assert_eq!(converted(42, I32, false).unwrap(), 42);
        assert_eq!(converted(-1, I8, false).unwrap(), -1);
        assert_eq!(converted(255, U8, false).unwrap(), 255);
    }

    #[test]
    fn negative_literals_never_become_unsigned() {
        for explicit in [false, true] {
            let error = converted(-1, U32, explicit).unwrap_err();
            assert_eq!(
                error.kind,
                ErrorKind::InvalidTypeCast("cannot change type's signedness".to_string())
            );
        }
    }

    #[test]
    fn implicit_out_of_range_is_value_loss() {
        let error = converted(300, U8, false).unwrap_err();
        assert_eq!(
            error.kind,
            ErrorKind::InvalidTypeCast("possible value loss".to_string())
        );
    }

    #[test]
    fn explicit_out_of_range_masks_and_resigns() {
        assert_eq!(converted(300, U8, true).unwrap(), 44);
        assert_eq!(converted(200, I8, true).unwrap(), -56);
        assert_eq!(converted(65535, I16, true).unwrap(), -1);
        assert_eq!(converted(-300, I8, true).unwrap(), -44);
    }

    #[test]
    fn conversion_round_trips_when_no_narrowing_happened() {
        for (literal, ty) in [(42i64, I32), (-7, I16), (100, U8), (0, U32)] {
            let Value::Integer {
                literal: forward, ..
            } = convert_integer(literal, ty, false, loc()).unwrap()
            else {
                panic!("expected a literal");
            };
            assert_eq!(forward, literal);
        }
    }
}
