use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Bitmask of the optional hooks a manager implements. The VM only calls a
/// hook when the matching bit is set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Self = Self(0);
    /// The component picks its layout per instance.
    pub const DYNAMIC_LAYOUT: Self = Self(1 << 0);
    /// `create` is called and its bucket becomes `this`.
    pub const CREATE_INSTANCE: Self = Self(1 << 1);
    /// `update` runs before the layout revalidates when an argument changed.
    pub const UPDATE_HOOK: Self = Self(1 << 2);
    /// `destroy` runs on teardown.
    pub const DESTRUCTOR: Self = Self(1 << 3);
    /// `create` receives the invocation's arguments.
    pub const CREATE_ARGS: Self = Self(1 << 4);
    /// Helper output is HTML and is appended without escaping.
    pub const TRUSTED_OUTPUT: Self = Self(1 << 5);

    pub const COMPONENT: Self = Self(
        Self::DYNAMIC_LAYOUT.0
            | Self::CREATE_INSTANCE.0
            | Self::UPDATE_HOOK.0
            | Self::DESTRUCTOR.0
            | Self::CREATE_ARGS.0,
    );
    pub const HELPER: Self = Self(Self::DESTRUCTOR.0 | Self::TRUSTED_OUTPUT.0);
    pub const MODIFIER: Self = Self(Self::DESTRUCTOR.0);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Bits outside `allowed`.
    pub const fn excess(self, allowed: Self) -> Self {
        Self(self.0 & !allowed.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: &[(Capabilities, &str)] = &[
            (Capabilities::DYNAMIC_LAYOUT, "DYNAMIC_LAYOUT"),
            (Capabilities::CREATE_INSTANCE, "CREATE_INSTANCE"),
            (Capabilities::UPDATE_HOOK, "UPDATE_HOOK"),
            (Capabilities::DESTRUCTOR, "DESTRUCTOR"),
            (Capabilities::CREATE_ARGS, "CREATE_ARGS"),
            (Capabilities::TRUSTED_OUTPUT, "TRUSTED_OUTPUT"),
        ];
        if self.is_empty() {
            return write!(f, "Capabilities(NONE)");
        }
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Capabilities({})", names.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks() {
        let caps = Capabilities::CREATE_INSTANCE | Capabilities::DESTRUCTOR;
        assert!(caps.contains(Capabilities::DESTRUCTOR));
        assert!(!caps.contains(Capabilities::UPDATE_HOOK));
        assert!(caps.excess(Capabilities::COMPONENT).is_empty());
        assert_eq!(caps.excess(Capabilities::HELPER), Capabilities::CREATE_INSTANCE);
        assert_eq!(format!("{caps:?}"), "Capabilities(CREATE_INSTANCE | DESTRUCTOR)");
    }
}
