use std::fmt;

use crate::error::CoreError;

/// Decoded create/update/delete/force flags for one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SyncIntent {
    create: bool,
    update: bool,
    delete: bool,
    force: bool,
}

impl SyncIntent {
    pub fn new(create: bool, update: bool, delete: bool, force: bool) -> Result<Self, CoreError> {
        if delete && create {
            return Err(CoreError::InvalidIntent("cannot delete AND create".into()));
        }
        if delete && update {
            return Err(CoreError::InvalidIntent("cannot delete AND update".into()));
        }
        Ok(Self {
            create,
            update,
            delete,
            force,
        })
    }

    pub fn create(&self) -> bool {
        self.create
    }

    pub fn update(&self) -> bool {
        self.update
    }

    pub fn delete(&self) -> bool {
        self.delete
    }

    pub fn force(&self) -> bool {
        self.force
    }

    /// None of create, update or delete is set.
    pub fn is_impotent(&self) -> bool {
        !(self.create || self.update || self.delete)
    }
}

impl fmt::Display for SyncIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncIntent {}", encode(self))
    }
}

/// Case-insensitive scan for `c`, `u`, `d` and `*`. Absent flags decode to
/// an impotent intent; other characters are ignored.
pub fn decode(flags: Option<&str>) -> Result<SyncIntent, CoreError> {
    let Some(flags) = flags else {
        return Ok(SyncIntent::default());
    };
    let has = |c: char| flags.chars().any(|f| f.eq_ignore_ascii_case(&c));
    SyncIntent::new(has('c'), has('u'), has('d'), flags.contains('*'))
}

pub fn encode(intent: &SyncIntent) -> String {
    let mut out = String::with_capacity(4);
    if intent.create {
        out.push('c');
    }
    if intent.update {
        out.push('u');
    }
    if intent.delete {
        out.push('d');
    }
    if intent.force {
        out.push('*');
    }
    out
}
