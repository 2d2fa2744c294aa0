/// Identifier of a meter
pub type MeterId = u64;

/// Identifier of a group of meters
pub type GroupId = u64;

/// Something that can be queried: a single meter, or a group that resolves to meters.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Entity {
    /// A single meter
    Meter(MeterId),

    /// A group of meters
    Group(GroupId),
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Meter(id) => write!(f, "meter:{id}"),
            Self::Group(id) => write!(f, "group:{id}"),
        }
    }
}
