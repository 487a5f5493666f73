//! The register manager.
//!
//! Tracks the eight 32-bit general-purpose registers.  `esp` and `ebp`
//! are the stack and frame pointers and are never handed out; the other
//! six are allocated on demand, one per live intermediate value.
//!
//! Allocations are exposed as opaque [AllocId] handles rather than raw
//! register names: the generator can change a value's width (`eax` to
//! `ax` to `al`) by re-formatting the same handle, and a displaced
//! allocation keeps its handle while moving to another register.

use derive_more::Display;

use crate::common::{ErrorKind, Location, Map, Result, Set};

use super::types::{IntType, Width};
use super::value::Value;

use Register::*;

/// The x86 register file, in encoding order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Display)]
pub enum Register {
    #[display("eax")]
    Eax,
    #[display("ecx")]
    Ecx,
    #[display("edx")]
    Edx,
    #[display("ebx")]
    Ebx,
    #[display("esp")]
    Esp,
    #[display("ebp")]
    Ebp,
    #[display("esi")]
    Esi,
    #[display("edi")]
    Edi,
}

/// Allocation preference order.  `esp` and `ebp` are reserved.
const ALLOCATABLE: [Register; 6] = [Eax, Ecx, Edx, Ebx, Esi, Edi];

/// Function results travel in `eax`.
pub const RETURN_REGISTER: Register = Eax;

impl Register {
    /// Does the register have an operand name at this width?  Byte names
    /// exist only for the first four registers on ia32.
    pub fn has_width(self, width: Width) -> bool {
        width != Width::Byte || matches!(self, Eax | Ecx | Edx | Ebx)
    }

    /// The operand name at the given width.
    pub fn name(self, width: Width) -> &'static str {
        match (self, width) {
            (Eax, Width::Dword) => "eax",
            (Eax, Width::Word) => "ax",
            (Eax, Width::Byte) => "al",
            (Ecx, Width::Dword) => "ecx",
            (Ecx, Width::Word) => "cx",
            (Ecx, Width::Byte) => "cl",
            (Edx, Width::Dword) => "edx",
            (Edx, Width::Word) => "dx",
            (Edx, Width::Byte) => "dl",
            (Ebx, Width::Dword) => "ebx",
            (Ebx, Width::Word) => "bx",
            (Ebx, Width::Byte) => "bl",
            (Esp, Width::Dword) => "esp",
            (Esp, Width::Word) => "sp",
            (Ebp, Width::Dword) => "ebp",
            (Ebp, Width::Word) => "bp",
            (Esi, Width::Dword) => "esi",
            (Esi, Width::Word) => "si",
            (Edi, Width::Dword) => "edi",
            (Edi, Width::Word) => "di",
            (register, Width::Byte) => {
                unreachable!("internal error: {register} has no byte-width name")
            }
        }
    }
}

/// An opaque handle to an allocation.  Stays valid across width changes
/// and displacements; resolving it yields the current concrete register.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AllocId(usize);

pub struct Registers {
    /// Every allocation ever made, by handle, mapped to the register it
    /// last resolved to.  Freed handles keep their entry so that values
    /// consumed by an elided move still format correctly.
    allocations: Vec<Register>,
    /// The live allocation holding each register.
    holders: Map<Register, AllocId>,
    /// Registers touched in the current function; drives the prologue
    /// and epilogue save set.
    used: Set<Register>,
}

impl Registers {
    pub fn new() -> Self {
        Registers {
            allocations: Vec::new(),
            holders: Map::new(),
            used: Set::new(),
        }
    }

    fn bind(&mut self, register: Register, ty: IntType) -> Value {
        let allocation = AllocId(self.allocations.len());
        self.allocations.push(register);
        self.holders.insert(register, allocation);
        Value::Register { ty, allocation }
    }

    /// Allocate a free register that can hold a value of `ty`.
    pub fn allocate(&mut self, ty: IntType, location: Location) -> Result<Value> {
        let register = ALLOCATABLE
            .iter()
            .copied()
            .find(|r| !self.holders.contains_key(r) && r.has_width(ty.width()))
            .ok_or_else(|| ErrorKind::OutOfRegisters.at(location))?;
        self.used.insert(register);
        Ok(self.bind(register, ty))
    }

    /// Force an allocation of one specific register.  A live holder is
    /// transparently reassigned to another free register; the returned
    /// `(new, old)` pair tells the caller which move to emit.
    pub fn require(
        &mut self,
        ty: IntType,
        register: Register,
        location: Location,
    ) -> Result<(Value, Option<(Register, Register)>)> {
        let displaced = match self.holders.remove(&register) {
            Some(holder) => {
                let new = ALLOCATABLE
                    .iter()
                    .copied()
                    .find(|r| *r != register && !self.holders.contains_key(r))
                    .ok_or_else(|| ErrorKind::OutOfRegisters.at(location))?;
                self.allocations[holder.0] = new;
                self.holders.insert(new, holder);
                self.used.insert(new);
                Some((new, register))
            }
            None => None,
        };
        Ok((self.bind(register, ty), displaced))
    }

    /// The register a call's or a function's result must end up in.
    pub fn get_return_register(
        &mut self,
        ty: IntType,
        location: Location,
    ) -> Result<(Value, Option<(Register, Register)>)> {
        self.require(ty, RETURN_REGISTER, location)
    }

    /// Release a register value.  Idempotent, and a no-op for values that
    /// do not own a register.
    pub fn free(&mut self, value: &Value) {
        if let Value::Register { allocation, .. } = value {
            let register = self.allocations[allocation.0];
            if self.holders.get(&register) == Some(allocation) {
                self.holders.remove(&register);
            }
        }
    }

    /// The concrete register an allocation currently resolves to.
    pub fn resolve(&self, allocation: AllocId) -> Register {
        self.allocations[allocation.0]
    }

    /// Registers touched since the last [Registers::reset_used], in
    /// register-file order.
    pub fn used(&self) -> impl Iterator<Item = Register> + '_ {
        self.used.iter().copied()
    }

    pub fn reset_used(&mut self) {
        self.used.clear();
    }

    /// How many allocations are live right now.
    pub fn live_count(&self) -> usize {
        self.holders.len()
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
