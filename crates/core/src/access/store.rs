//! Persistent grant store.
//!
//! All grants live in one JSON file, which is the only copy: every call reads it afresh, and every
//! mutation re-reads, modifies and atomically replaces it under an exclusive file lock. Handles in
//! other processes (the REST server and the CLI) therefore see each other's grants, supersede-then-
//! insert is all-or-nothing, and the last grant created for a (doctor, patient) pair is the only
//! one a later verification can resolve.

use super::grant::AccessGrant;
use crate::records::{DoctorId, PatientId};
use crate::storage::{modify_json, read_json};
use crate::PortalResult;
use carelith_uuid::GrantId;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct GrantStore {
    path: PathBuf,
}

impl GrantStore {
    /// Open the grant file at `path`; a missing file is an empty store.
    ///
    /// An existing file is parsed once here so a corrupt store fails at startup.
    pub fn open(path: &Path) -> PortalResult<Self> {
        read_json::<Vec<AccessGrant>>(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn load(&self) -> PortalResult<Vec<AccessGrant>> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    /// Delete every grant for `grant`'s (doctor, patient) pair and insert `grant`.
    ///
    /// Returns the ids of the grants that were removed.
    pub fn supersede(&self, grant: AccessGrant) -> PortalResult<Vec<GrantId>> {
        modify_json(&self.path, |grants: &mut Vec<AccessGrant>| {
            let (removed, mut kept): (Vec<_>, Vec<_>) = grants
                .drain(..)
                .partition(|g| g.is_for(&grant.doctor, &grant.patient));
            kept.push(grant);
            *grants = kept;
            Ok((true, removed.into_iter().map(|g| g.id).collect()))
        })
    }

    pub fn get(&self, id: &GrantId) -> PortalResult<Option<AccessGrant>> {
        Ok(self.load()?.into_iter().find(|g| &g.id == id))
    }

    pub fn find_for_pair(
        &self,
        doctor: &DoctorId,
        patient: &PatientId,
    ) -> PortalResult<Option<AccessGrant>> {
        Ok(self
            .load()?
            .into_iter()
            .rev()
            .find(|g| g.is_for(doctor, patient)))
    }

    /// Grants naming `patient`, newest first.
    pub fn for_patient(&self, patient: &PatientId) -> PortalResult<Vec<AccessGrant>> {
        let mut grants: Vec<_> = self
            .load()?
            .into_iter()
            .filter(|g| &g.patient == patient)
            .collect();
        grants.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(grants)
    }

    /// Run `f` on the grant with `id` while holding the store lock.
    ///
    /// `f` returns whether it changed the grant plus a result; the file is only rewritten on a
    /// change. Returns `None` if no such grant exists.
    pub fn update<R>(
        &self,
        id: &GrantId,
        f: impl FnOnce(&mut AccessGrant) -> (bool, R),
    ) -> PortalResult<Option<R>> {
        modify_json(&self.path, |grants: &mut Vec<AccessGrant>| {
            let Some(grant) = grants.iter_mut().find(|g| &g.id == id) else {
                return Ok((false, None));
            };
            let (changed, result) = f(grant);
            Ok((changed, Some(result)))
        })
    }
}
