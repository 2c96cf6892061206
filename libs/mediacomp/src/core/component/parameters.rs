// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use super::ComponentCore;
use crate::core::error::{ComponentError, Result};
use crate::core::params::{Param, ParamHeader, PortDomainsParam};
use crate::core::port::Port;
use crate::core::state::State;

impl ComponentCore {
    pub(crate) fn get_parameter(&self, param: &mut Param) -> Result<()> {
        if self.state() == State::Invalid {
            return Err(ComponentError::InvalidState);
        }
        param.check_header()?;

        match param {
            Param::PortDefinition(definition) => {
                *definition = self.port(definition.port_index)?.definition();
            }
            Param::BufferSupplier(supplier) => {
                supplier.supplier = self.port(supplier.port_index)?.supplier_role();
            }
            Param::Priority(priority) => {
                *priority = *self.priority.lock();
            }
            Param::PortDomains(domains) => {
                let (start_port, port_count) = self.domain_range(domains.domain);
                *domains = PortDomainsParam {
                    header: ParamHeader::of::<PortDomainsParam>(),
                    domain: domains.domain,
                    start_port,
                    port_count,
                };
            }
        }
        Ok(())
    }

    pub(crate) fn set_parameter(&self, param: &Param) -> Result<()> {
        let state = self.state();
        if state == State::Invalid {
            return Err(ComponentError::InvalidState);
        }
        param.check_header()?;

        match param {
            Param::PortDefinition(definition) => {
                let port = self.configurable_port(definition.port_index, state)?;
                port.apply_definition(definition)?;
                tracing::debug!(
                    "[{}] Port {}: {} x {} bytes",
                    self.name(),
                    port.index(),
                    definition.buffer_count_actual,
                    definition.buffer_size
                );
            }
            Param::BufferSupplier(supplier) => {
                let port = self.configurable_port(supplier.port_index, state)?;
                port.set_supplier(self, supplier.supplier)?;
            }
            Param::Priority(priority) => {
                if !matches!(state, State::Loaded | State::WaitForResources) {
                    return Err(ComponentError::IncorrectStateOperation(format!(
                        "priority change in {}",
                        state
                    )));
                }
                *self.priority.lock() = *priority;
            }
            Param::PortDomains(_) => {
                return Err(ComponentError::UnsupportedIndex(
                    "PortDomains is read-only".into(),
                ));
            }
        }
        Ok(())
    }

    /// Port settings may change only in Loaded/WaitForResources or while
    /// the port is disabled.
    fn configurable_port(&self, index: u32, state: State) -> Result<&Port> {
        let port: &Port = self.port(index)?;
        let loaded = matches!(state, State::Loaded | State::WaitForResources);
        if !loaded && port.is_enabled() {
            return Err(ComponentError::IncorrectStateOperation(format!(
                "port {} is enabled in {}",
                index, state
            )));
        }
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{ComponentConfig, PortConfig};
    use crate::core::events::ChannelCallbacks;
    use crate::core::params::{
        BufferSupplier, BufferSupplierParam, PortDefinition, PortDomain, PortFormat,
        PriorityParam,
    };

    fn core() -> std::sync::Arc<ComponentCore> {
        let config = ComponentConfig::new("params")
            .with_port(PortConfig::input(PortFormat::audio("pcm")).with_buffers(2, 256))
            .with_port(
                PortConfig::output(PortFormat::audio("pcm"))
                    .with_supplier_preference(BufferSupplier::Output),
            );
        let (callbacks, _receivers) = ChannelCallbacks::new();
        ComponentCore::for_tests(config, callbacks)
    }

    #[test]
    fn test_port_definition_round_trip() {
        let core = core();
        let mut param = Param::PortDefinition(PortDefinition::query(0));
        core.get_parameter(&mut param).unwrap();
        let Param::PortDefinition(mut definition) = param else {
            panic!("wrong parameter kind");
        };
        assert_eq!(definition.buffer_size, 256);

        definition.buffer_count_actual = 3;
        core.set_parameter(&Param::PortDefinition(definition)).unwrap();
        assert_eq!(core.port(0).unwrap().buffer_count_actual(), 3);
    }

    #[test]
    fn test_bad_port_and_bad_header() {
        let core = core();
        let mut param = Param::PortDefinition(PortDefinition::query(9));
        assert_eq!(
            core.get_parameter(&mut param),
            Err(ComponentError::BadPortIndex(9))
        );

        let mut supplier = BufferSupplierParam::query(0);
        supplier.header.version.minor = 0;
        assert!(matches!(
            core.set_parameter(&Param::BufferSupplier(supplier)),
            Err(ComponentError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_supplier_preference_reported_untunneled() {
        let core = core();
        let mut param = Param::BufferSupplier(BufferSupplierParam::query(1));
        core.get_parameter(&mut param).unwrap();
        assert_eq!(
            param,
            Param::BufferSupplier(BufferSupplierParam::new(1, BufferSupplier::Output))
        );

        core.set_parameter(&Param::BufferSupplier(BufferSupplierParam::new(
            0,
            BufferSupplier::Input,
        )))
        .unwrap();
        assert_eq!(
            core.port(0).unwrap().supplier_role(),
            BufferSupplier::Input
        );
    }

    #[test]
    fn test_settings_locked_outside_loaded() {
        let core = core();
        core.set_state(State::Idle);

        let definition = core.port(0).unwrap().definition();
        assert!(matches!(
            core.set_parameter(&Param::PortDefinition(definition)),
            Err(ComponentError::IncorrectStateOperation(_))
        ));
        assert!(matches!(
            core.set_parameter(&Param::Priority(PriorityParam::new(1, 2))),
            Err(ComponentError::IncorrectStateOperation(_))
        ));
    }

    #[test]
    fn test_port_domains() {
        let core = core();
        let mut param = Param::PortDomains(PortDomainsParam::query(PortDomain::Audio));
        core.get_parameter(&mut param).unwrap();
        let Param::PortDomains(domains) = param else {
            panic!("wrong parameter kind");
        };
        assert_eq!((domains.start_port, domains.port_count), (0, 2));
    }
}
