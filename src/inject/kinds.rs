use bitflags::bitflags;
use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

/// What kind of site an injection applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Target {
    /// The class itself
    Class,
    /// One declared field
    Field,
    /// One declared method or constructor
    Method,
}

/// Classification of the effect an injection has on its site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Delta {
    /// Adds a member
    Addition,
    /// Changes existing behavior
    Modification,
    /// Suppresses existing behavior
    Removal,
    /// No effect
    None,
}

/// The closed set of injection variants.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount, IntoStaticStr,
)]
pub enum InjectionKind {
    /// Declare a new field
    AddField,
    /// Declare a new method
    AddMethod,
    /// Skip the call when a predicate holds
    IgnoreMethod,
    /// Rewrite the arguments before the call
    PreHook,
    /// Rewrite the return value after the call
    PostHook,
    /// Substitute the method body
    ReplaceMethod,
    /// Supply a value when the call raises
    ErrorRecovery,
    /// No change
    None,
}

impl InjectionKind {
    /// Target kind of every injection of this kind.
    ///
    /// [`InjectionKind::None`] has no fixed target; this returns `None` for it.
    #[must_use]
    pub fn target(self) -> Option<Target> {
        match self {
            InjectionKind::AddField | InjectionKind::AddMethod => Some(Target::Class),
            InjectionKind::IgnoreMethod
            | InjectionKind::PreHook
            | InjectionKind::PostHook
            | InjectionKind::ReplaceMethod
            | InjectionKind::ErrorRecovery => Some(Target::Method),
            InjectionKind::None => None,
        }
    }

    /// Delta of every injection of this kind.
    #[must_use]
    pub fn delta(self) -> Delta {
        match self {
            InjectionKind::AddField | InjectionKind::AddMethod => Delta::Addition,
            InjectionKind::IgnoreMethod => Delta::Removal,
            InjectionKind::PreHook
            | InjectionKind::PostHook
            | InjectionKind::ReplaceMethod
            | InjectionKind::ErrorRecovery => Delta::Modification,
            InjectionKind::None => Delta::None,
        }
    }

    /// Position of this kind in the fixed application order, lower first.
    ///
    /// Removals come first, then pre-hooks, then every other modification, then replacements
    /// and recoveries, and post-hooks last. Additions share the middle rank.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            kind if kind.delta() == Delta::Removal => 0,
            InjectionKind::PreHook => 1,
            InjectionKind::ReplaceMethod | InjectionKind::ErrorRecovery => 3,
            InjectionKind::PostHook => 4,
            _ => 2,
        }
    }

    /// The capability bit a backend advertises to accept this kind.
    #[must_use]
    pub fn flag(self) -> InjectionKinds {
        match self {
            InjectionKind::AddField => InjectionKinds::ADD_FIELD,
            InjectionKind::AddMethod => InjectionKinds::ADD_METHOD,
            InjectionKind::IgnoreMethod => InjectionKinds::IGNORE_METHOD,
            InjectionKind::PreHook => InjectionKinds::PRE_HOOK,
            InjectionKind::PostHook => InjectionKinds::POST_HOOK,
            InjectionKind::ReplaceMethod => InjectionKinds::REPLACE_METHOD,
            InjectionKind::ErrorRecovery => InjectionKinds::ERROR_RECOVERY,
            InjectionKind::None => InjectionKinds::empty(),
        }
    }
}

bitflags! {
    /// Set of injection kinds a backend can realize.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InjectionKinds: u8 {
        /// [`InjectionKind::AddField`]
        const ADD_FIELD = 0x01;
        /// [`InjectionKind::AddMethod`]
        const ADD_METHOD = 0x02;
        /// [`InjectionKind::IgnoreMethod`]
        const IGNORE_METHOD = 0x04;
        /// [`InjectionKind::PreHook`]
        const PRE_HOOK = 0x08;
        /// [`InjectionKind::PostHook`]
        const POST_HOOK = 0x10;
        /// [`InjectionKind::ReplaceMethod`]
        const REPLACE_METHOD = 0x20;
        /// [`InjectionKind::ErrorRecovery`]
        const ERROR_RECOVERY = 0x40;

        /// Every class-level addition
        const ADDITIONS = Self::ADD_FIELD.bits() | Self::ADD_METHOD.bits();
        /// Every method interception kind
        const INTERCEPTION = Self::IGNORE_METHOD.bits()
            | Self::PRE_HOOK.bits()
            | Self::POST_HOOK.bits()
            | Self::REPLACE_METHOD.bits()
            | Self::ERROR_RECOVERY.bits();
    }
}

impl InjectionKinds {
    /// Returns true if `kind` is in the set. [`InjectionKind::None`] is always accepted.
    #[must_use]
    pub fn supports(self, kind: InjectionKind) -> bool {
        self.contains(kind.flag())
    }
}
