//! Trap Frame
//!
//! The register state a user process enters the kernel with on a `syscall`
//! instruction, saved by the entry stub and restored on return.
//!
//! # Calling Convention
//! - `rax`: syscall number on entry, return value on exit
//! - `rdi`, `rsi`, `rdx`, `r10`, `r8`, `r9`: arguments 0 through 5
//! - `rsp`: user stack pointer at the time of the call

/// Saved user register state.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    /// Return address in user space.
    pub rip: u64,
    pub rflags: u64,
    /// User stack pointer.
    pub rsp: u64,
}

impl TrapFrame {
    /// Number of argument registers.
    pub const MAX_ARGS: usize = 6;

    /// Build the frame of a syscall with the given number and arguments.
    /// Missing arguments are zero, extras are ignored.
    pub fn syscall(number: u64, args: &[u64]) -> Self {
        let mut frame = Self {
            rax: number,
            ..Self::default()
        };
        for (n, &value) in args.iter().take(Self::MAX_ARGS).enumerate() {
            *frame.arg_mut(n) = value;
        }
        frame
    }

    /// The syscall number.
    #[inline]
    pub fn number(&self) -> u64 {
        self.rax
    }

    /// Argument `n` (0-based). Out-of-range indices read as 0.
    #[inline]
    pub fn arg(&self, n: usize) -> u64 {
        match n {
            0 => self.rdi,
            1 => self.rsi,
            2 => self.rdx,
            3 => self.r10,
            4 => self.r8,
            5 => self.r9,
            _ => 0,
        }
    }

    fn arg_mut(&mut self, n: usize) -> &mut u64 {
        match n {
            0 => &mut self.rdi,
            1 => &mut self.rsi,
            2 => &mut self.rdx,
            3 => &mut self.r10,
            4 => &mut self.r8,
            _ => &mut self.r9,
        }
    }

    /// Write the return slot.
    #[inline]
    pub fn set_return(&mut self, value: u64) {
        self.rax = value;
    }
}
