use std::fmt;
use std::marker::PhantomData;

/// Typed index. The tag keeps machine, VNF, link and service ids from being mixed up.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Id<T> {
    pub id: usize,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub const fn new(id: usize) -> Self {
        Id { id, _marker: PhantomData }
    }

    pub fn index(&self) -> usize {
        self.id
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<T> From<Id<T>> for usize {
    fn from(id_wrapper: Id<T>) -> Self {
        id_wrapper.id
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full_name = std::any::type_name::<T>();
        let clean_name = full_name.split("::").last().unwrap_or(full_name);
        let display_name = clean_name.replace("Tag", "Id");

        write!(f, "{}({})", display_name, self.id)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct NetworkTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct MachineTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct VnfTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct LinkTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct ServiceTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct ServiceSetTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct BatchTag;

pub type NetworkId = Id<NetworkTag>;
pub type MachineId = Id<MachineTag>;
pub type VnfId = Id<VnfTag>;
pub type LinkId = Id<LinkTag>;
pub type ServiceId = Id<ServiceTag>;
pub type ServiceSetId = Id<ServiceSetTag>;
pub type BatchId = Id<BatchTag>;

/// Process-local id of a configuration (column). Strictly increasing within one run.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct ConfigurationId(pub u64);

impl fmt::Display for ConfigurationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cfg-{}", self.0)
    }
}

/// Counters for configuration and batch ids.
///
/// Owned by whoever drives a run (usually the batch manager) and reset explicitly between
/// independent runs.
#[derive(Debug, Default, Clone)]
pub struct IdGenerator {
    next_configuration: u64,
    next_batch: usize,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_configuration_id(&mut self) -> ConfigurationId {
        let id = ConfigurationId(self.next_configuration);
        self.next_configuration += 1;
        id
    }

    pub fn next_batch_id(&mut self) -> BatchId {
        let id = BatchId::new(self.next_batch);
        self.next_batch += 1;
        id
    }

    pub fn reset(&mut self) {
        self.next_configuration = 0;
        self.next_batch = 0;
    }
}
