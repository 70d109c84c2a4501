//! Profiler results
//!
//! `ProfileInfoBegin/ProfileInfo*/ProfileInfoEnd` replaces the function
//! list. Callees of one function are fetched with
//! `ProfileInfoLookupPerform`; replies come back in request order.

use std::collections::VecDeque;

use luadbg_protocol::{ProfileLookup, ProfileRecord};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ProfiledFunction {
    pub record: ProfileRecord,
    pub callees: Vec<ProfileRecord>,
    pub callees_loaded: bool,
}

impl ProfiledFunction {
    pub fn key(&self) -> ProfileLookup {
        lookup_key(&self.record)
    }
}

fn lookup_key(record: &ProfileRecord) -> ProfileLookup {
    ProfileLookup {
        function_name: record.function_name.clone(),
        rel_script_path: record.rel_script_path.clone(),
        line_defined: record.line_defined,
    }
}

#[derive(Debug, Default)]
pub struct Profiler {
    functions: Vec<ProfiledFunction>,
    staging: Option<Vec<ProfiledFunction>>,
    pending: VecDeque<ProfileLookup>,
    active: Option<ProfileLookup>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn functions(&self) -> &[ProfiledFunction] {
        &self.functions
    }

    pub fn function(&self, key: &ProfileLookup) -> Option<&ProfiledFunction> {
        self.functions.iter().find(|f| f.key() == *key)
    }

    pub fn clear(&mut self) {
        self.functions.clear();
        self.staging = None;
        self.pending.clear();
        self.active = None;
    }

    pub fn begin(&mut self) {
        if self.staging.is_some() {
            warn!("profile list restarted before it ended");
        }
        self.staging = Some(Vec::new());
    }

    pub fn add(&mut self, record: ProfileRecord) {
        let Some(staging) = self.staging.as_mut() else {
            warn!(function = %record.function_name, "profile record outside a list");
            return;
        };
        staging.push(ProfiledFunction {
            record,
            callees: Vec::new(),
            callees_loaded: false,
        });
    }

    pub fn end(&mut self) {
        match self.staging.take() {
            Some(functions) => {
                debug!(count = functions.len(), "profile list replaced");
                self.functions = functions;
            }
            None => warn!("profile list end without begin"),
        }
    }

    /// Record a sent `ProfileInfoLookupPerform`; its reply is matched in
    /// request order
    pub fn expect_callees(&mut self, key: ProfileLookup) {
        self.pending.push_back(key);
    }

    pub fn pending_lookups(&self) -> usize {
        self.pending.len()
    }

    pub fn lookup_begin(&mut self) {
        let Some(key) = self.pending.pop_front() else {
            warn!("profile lookup reply with no pending request");
            self.active = None;
            return;
        };
        match self.functions.iter_mut().find(|f| f.key() == key) {
            Some(function) => {
                function.callees.clear();
                self.active = Some(key);
            }
            None => {
                warn!(function = %key.function_name, "profile lookup for unknown function");
                self.active = None;
            }
        }
    }

    pub fn lookup_add(&mut self, record: ProfileRecord) {
        let Some(key) = &self.active else { return };
        if let Some(function) = self.functions.iter_mut().find(|f| f.key() == *key) {
            function.callees.push(record);
        }
    }

    pub fn lookup_end(&mut self) {
        if let Some(key) = self.active.take() {
            if let Some(function) = self.functions.iter_mut().find(|f| f.key() == key) {
                function.callees_loaded = true;
            }
        }
    }
}
