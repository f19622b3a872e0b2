#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Aa64,
    Arm,
    Ia32,
    Ia64,
    X64,
}

impl Architecture {
    pub fn efi_id(self) -> &'static str {
        match self {
            Self::Aa64 => "AA64",
            Self::Arm => "ARM",
            Self::Ia32 => "IA32",
            Self::Ia64 => "IA64",
            Self::X64 => "X64",
        }
    }

    pub fn from_machine(machine: &str) -> Option<Self> {
        match machine.trim() {
            "aarch64" | "aarch64_be" => Some(Self::Aa64),
            "arm" => Some(Self::Arm),
            "ia32" | "x86" => Some(Self::Ia32),
            "ia64" => Some(Self::Ia64),
            "x86_64" => Some(Self::X64),
            _ => None,
        }
    }

    pub fn current() -> Option<Self> {
        Self::from_machine(std::env::consts::ARCH)
    }
}
