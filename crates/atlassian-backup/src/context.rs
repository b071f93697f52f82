use core::fmt::Display;

use crate::service::Service;

/// Holds the context for the current operation. Used for prefixing logs.
#[derive(Default, Debug, Clone, Copy)]
pub struct Context {
    /// The service being worked on.
    pub service: Option<Service>,
    /// The current step.
    pub current_context: &'static str,
}

impl Context {
    /// Create a context for a step.
    pub fn new(current_context: &'static str) -> Self {
        Self {
            service: None,
            current_context,
        }
    }

    /// The same step, for a given service.
    pub fn with_service(self, service: Service) -> Self {
        Self {
            service: Some(service),
            ..self
        }
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(service) = &self.service {
            write!(f, "[{service}] ")?;
        }

        write!(f, "[{}] ", self.current_context)?;

        Ok(())
    }
}
