//! Object lifecycle: creation, loading, context save/load, and release.
//!
//! Every handle the module hands out is wrapped in an [`Object`] guard.
//! Dropping the guard flushes the handle, so a flow that bails out with
//! `?` halfway through still leaves the module's object table as it found
//! it. Release failures during drop are logged and swallowed; call
//! [`Object::release`] to see them.
//!
//! Saving a context consumes the live [`Object`] and yields a
//! [`ContextBlob`]; loading consumes the blob and yields a new `Object`.
//! A live handle and its saved blob are never both in the caller's hands.

use std::fmt;
use std::ptr;

use tracing::{debug, warn};
use tpm_protocol::commands::{ContextLoad, ContextSave, Create, CreatePrimary, FlushContext, Load};
use tpm_protocol::types::{AuthHandle, Authorization, Context, PcrSelectionList, PublicArea};
use tpm_protocol::{Data, Handle, Hierarchy, Name, Private, ResponseCode};

use crate::error::{ClientError, Result};
use crate::templates::Template;
use crate::tpm::Tpm;
use crate::transport::Transport;

/// The sensitive and public halves of an object created under a parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlob {
    pub private: Private,
    pub public: PublicArea,
    /// Auth value the loaded object will require.
    pub auth: Authorization,
}

/// A suspended object.
///
/// Only meaningful to the module session that produced it, and only once.
/// Cloning is allowed so a caller can retry a load the module refused for
/// lack of room, but every clone becomes stale on the first successful
/// [`Tpm::load_context`] of any copy: loading a stale clone fails with
/// [`ClientError::ContextStale`]. Keep at most one copy around once the
/// object is live again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBlob {
    context: Context,
    name: Name,
    auth: Authorization,
    public: Option<PublicArea>,
}

impl ContextBlob {
    /// The module's saved context structure.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn name(&self) -> &Name {
        &self.name
    }
}

/// A live module handle that is flushed when dropped.
pub struct Object<'tpm, T: Transport> {
    tpm: &'tpm Tpm<T>,
    handle: Handle,
    name: Name,
    auth: Authorization,
    public: Option<PublicArea>,
    live: bool,
}

impl<'tpm, T: Transport> Object<'tpm, T> {
    pub(crate) fn new(
        tpm: &'tpm Tpm<T>,
        handle: Handle,
        name: Name,
        auth: Authorization,
        public: Option<PublicArea>,
    ) -> Self {
        Self {
            tpm,
            handle,
            name,
            auth,
            public,
            live: true,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The name the module reported for this object.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Public area, for keys. Sequences have none.
    pub fn public(&self) -> Option<&PublicArea> {
        self.public.as_ref()
    }

    /// Handle, name, and authorization for a command that uses this object.
    pub fn auth_handle(&self) -> AuthHandle {
        AuthHandle::new(self.handle, self.name.clone(), self.auth.clone())
    }

    pub fn tpm(&self) -> &'tpm Tpm<T> {
        self.tpm
    }

    /// Flush the handle, reporting any failure.
    ///
    /// Takes the guard by value, so a handle is flushed at most once by
    /// its owner and a recycled handle value is never hit by a stale copy.
    pub fn release(mut self) -> Result<()> {
        self.live = false;
        self.tpm.flush(self.handle)
    }

    /// Give up the guard for a handle the module has already retired.
    pub(crate) fn consumed(mut self) -> Handle {
        self.live = false;
        self.handle
    }
}

impl<T: Transport> Drop for Object<'_, T> {
    fn drop(&mut self) {
        if !self.live {
            return;
        }
        if let Err(err) = self.tpm.flush(self.handle) {
            warn!(handle = %self.handle, error = %err, "failed to release handle");
        }
    }
}

impl<T: Transport> fmt::Debug for Object<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Tpm<T> {
    /// Derive a primary object under a hierarchy root.
    pub fn create_primary(&self, hierarchy: Hierarchy, template: &Template) -> Result<Object<'_, T>> {
        let response = self
            .execute(&CreatePrimary {
                primary: AuthHandle::hierarchy(hierarchy, Authorization::Empty),
                sensitive: template.sensitive(),
                public: template.public.clone(),
                outside_info: Data::empty(),
                creation_pcr: PcrSelectionList::default(),
            })
            .map_err(ClientError::into_template_error)?;

        debug!(handle = %response.object_handle, hierarchy = ?hierarchy, "primary created");
        Ok(Object::new(
            self,
            response.object_handle,
            response.name,
            template.authorization(),
            Some(response.out_public),
        ))
    }

    /// Create an object under `parent` without loading it.
    pub fn create_object(&self, parent: &Object<'_, T>, template: &Template) -> Result<KeyBlob> {
        self.check_owner(parent)?;
        let response = self
            .execute(&Create {
                parent: parent.auth_handle(),
                sensitive: template.sensitive(),
                public: template.public.clone(),
                outside_info: Data::empty(),
                creation_pcr: PcrSelectionList::default(),
            })
            .map_err(ClientError::into_template_error)?;

        debug!(parent = %parent.handle, "object created");
        Ok(KeyBlob {
            private: response.out_private,
            public: response.out_public,
            auth: template.authorization(),
        })
    }

    /// Load a created object under the parent it was created with.
    pub fn load(&self, parent: &Object<'_, T>, blob: &KeyBlob) -> Result<Object<'_, T>> {
        self.check_owner(parent)?;
        let response = self
            .execute(&Load {
                parent: parent.auth_handle(),
                in_private: blob.private.clone(),
                in_public: blob.public.clone(),
            })
            .map_err(ClientError::into_load_error)?;

        debug!(handle = %response.object_handle, parent = %parent.handle, "object loaded");
        Ok(Object::new(
            self,
            response.object_handle,
            response.name,
            blob.auth.clone(),
            Some(blob.public.clone()),
        ))
    }

    /// Save an object's context and release the superseded handle.
    ///
    /// The handle is flushed right after the save. This relies on the
    /// module keeping the saved blob valid once the handle is gone.
    pub fn save_context(&self, object: Object<'_, T>) -> Result<ContextBlob> {
        self.check_owner(&object)?;
        let response = self.execute(&ContextSave {
            save_handle: object.handle,
        })?;

        let blob = ContextBlob {
            context: response.context,
            name: object.name.clone(),
            auth: object.auth.clone(),
            public: object.public.clone(),
        };
        let handle = object.handle;
        if let Err(err) = object.release() {
            warn!(handle = %handle, error = %err, "failed to release saved handle");
        }
        debug!(handle = %handle, sequence = blob.context.sequence, "context saved");
        Ok(blob)
    }

    /// Turn a saved context back into a live object.
    pub fn load_context(&self, blob: ContextBlob) -> Result<Object<'_, T>> {
        let sequence = blob.context.sequence;
        let response = self
            .execute(&ContextLoad {
                context: blob.context,
            })
            .map_err(ClientError::into_context_error)?;

        debug!(handle = %response.loaded_handle, sequence, "context loaded");
        Ok(Object::new(
            self,
            response.loaded_handle,
            blob.name,
            blob.auth,
            blob.public,
        ))
    }

    /// Release an object, reporting any failure.
    pub fn release(&self, object: Object<'_, T>) -> Result<()> {
        self.check_owner(&object)?;
        object.release()
    }

    /// Flush a handle.
    ///
    /// A handle the module no longer knows is logged and treated as
    /// released. Only guards call this: the module recycles the lowest
    /// free slot, so a raw handle value may already name another object.
    pub(crate) fn flush(&self, handle: Handle) -> Result<()> {
        match self.execute(&FlushContext {
            flush_handle: handle,
        }) {
            Ok(_) => {
                debug!(handle = %handle, "handle released");
                Ok(())
            }
            Err(err) if err.is_code(ResponseCode::HANDLE) => {
                warn!(handle = %handle, "handle was already released");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn check_owner(&self, object: &Object<'_, T>) -> Result<()> {
        if ptr::eq(self, object.tpm) {
            Ok(())
        } else {
            Err(ClientError::InvalidArgument(format!(
                "handle {} belongs to another connection",
                object.handle
            )))
        }
    }
}
