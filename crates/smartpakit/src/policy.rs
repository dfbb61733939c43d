use alloc::vec::Vec;

/// Register access categories a policy is kept for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Category {
    Readable,
    Writeable,
    /// The register may change behind the driver's back and is never cached.
    Volatile,
}

/// Address policy for one category.
///
/// Addresses are kept sorted so lookups are a binary search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Policy {
    /// Only the listed addresses are permitted.
    AllowOnly(Vec<u32>),
    /// Every address except the listed ones is permitted.
    DenyOnly(Vec<u32>),
    #[default]
    DefaultPermit,
}

impl Policy {
    /// Build a policy from optional allow and deny lists.
    ///
    /// The allow list takes precedence when both are populated.
    pub fn from_lists(allow: &[u32], deny: &[u32]) -> Self {
        if !allow.is_empty() {
            if !deny.is_empty() {
                warn!(
                    "both allow ({}) and deny ({}) lists configured, using allow list",
                    allow.len(),
                    deny.len()
                );
            }
            Policy::AllowOnly(sorted(allow))
        } else if !deny.is_empty() {
            Policy::DenyOnly(sorted(deny))
        } else {
            Policy::DefaultPermit
        }
    }

    pub fn permits(&self, address: u32) -> bool {
        match self {
            Policy::AllowOnly(list) => list.binary_search(&address).is_ok(),
            Policy::DenyOnly(list) => list.binary_search(&address).is_err(),
            Policy::DefaultPermit => true,
        }
    }
}

fn sorted(addresses: &[u32]) -> Vec<u32> {
    let mut list = addresses.to_vec();
    list.sort_unstable();
    list.dedup();
    list
}

/// Per-chip access policy, one [`Policy`] per [`Category`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessPolicy {
    pub readable: Policy,
    pub writeable: Policy,
    pub volatile: Policy,
}

impl AccessPolicy {
    pub fn is_permitted(&self, address: u32, category: Category) -> bool {
        match category {
            Category::Readable => self.readable.permits(address),
            Category::Writeable => self.writeable.permits(address),
            Category::Volatile => self.volatile.permits(address),
        }
    }
}
