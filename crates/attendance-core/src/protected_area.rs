use std::sync::Arc;

use crate::error::StoreError;
use crate::store::{keys, remove_all, KeyValueStore};

/// Tab-scoped "already stepped up here" flag layered over the shared
/// persistent store.
///
/// The flag is only honoured by the tab that set it: every tab reads the
/// same persistent entries, and the owner tag is what keeps tab B from
/// inheriting tab A's protected state.
#[derive(Clone)]
pub struct ProtectedAreaCoordinator {
    persistent: Arc<dyn KeyValueStore>,
    tab: Arc<dyn KeyValueStore>,
}

impl ProtectedAreaCoordinator {
    pub fn new(persistent: Arc<dyn KeyValueStore>, tab: Arc<dyn KeyValueStore>) -> Self {
        Self { persistent, tab }
    }

    /// Returns this tab's id, minting and announcing one on first use.
    pub fn ensure_tab_identity(&self) -> Result<String, StoreError> {
        if let Some(id) = self.current_tab_id() {
            return Ok(id);
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        self.tab.set(keys::TAB_ID, &id)?;
        self.persistent.set(keys::ACTIVE_TAB_ID, &id)?;
        log::debug!("Assigned tab id {id}");
        Ok(id)
    }

    pub fn tab_id(&self) -> Result<String, StoreError> {
        self.ensure_tab_identity()
    }

    /// Read-only view of the tab id; never mints one.
    pub fn current_tab_id(&self) -> Option<String> {
        self.tab.get(keys::TAB_ID).filter(|id| !id.is_empty())
    }

    pub fn activate(&self) -> Result<(), StoreError> {
        let id = self.ensure_tab_identity()?;
        // Owner first: a reader must never see the flag paired with a stale owner.
        self.persistent.set(keys::PROTECTED_AREA_TAB_ID, &id)?;
        self.persistent.set(keys::IN_PROTECTED_AREA, "true")?;
        log::info!("Protected area activated for tab {id}");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        let Some(tab_id) = self.current_tab_id() else {
            return false;
        };

        self.persistent.get(keys::IN_PROTECTED_AREA).as_deref() == Some("true")
            && self.persistent.get(keys::PROTECTED_AREA_TAB_ID).as_deref() == Some(tab_id.as_str())
    }

    fn is_owner(&self) -> bool {
        match (self.current_tab_id(), self.persistent.get(keys::PROTECTED_AREA_TAB_ID)) {
            (Some(mine), Some(owner)) => mine == owner,
            _ => false,
        }
    }

    /// Drop the flag, but only if this tab owns it.
    pub fn clear(&self) -> Result<(), StoreError> {
        if !self.is_owner() {
            return Ok(());
        }

        remove_all(
            self.persistent.as_ref(),
            &[keys::IN_PROTECTED_AREA, keys::PROTECTED_AREA_TAB_ID],
        )?;
        log::info!("Protected area cleared by owning tab");
        Ok(())
    }

    /// Drop the flag whoever owns it. Logout only.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        remove_all(
            self.persistent.as_ref(),
            &[keys::IN_PROTECTED_AREA, keys::PROTECTED_AREA_TAB_ID],
        )
    }

    /// Tab is being discarded.
    pub fn on_unload(&self) -> Result<(), StoreError> {
        self.clear()
    }

    /// Called when a tab loads. The returned handle runs the unload hook
    /// when dropped.
    pub fn attach(&self) -> Result<TabSession, StoreError> {
        let id = self.ensure_tab_identity()?;
        self.persistent.set(keys::ACTIVE_TAB_ID, &id)?;
        Ok(TabSession {
            coordinator: self.clone(),
            tab_id: id,
        })
    }
}

/// Lifetime of one tab. Dropping it is the "tab closed" event.
pub struct TabSession {
    coordinator: ProtectedAreaCoordinator,
    tab_id: String,
}

impl TabSession {
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn coordinator(&self) -> &ProtectedAreaCoordinator {
        &self.coordinator
    }
}

impl Drop for TabSession {
    fn drop(&mut self) {
        if let Err(e) = self.coordinator.on_unload() {
            log::error!("Failed to clear protected area for tab {} on unload: {e}", self.tab_id);
        }
    }
}
