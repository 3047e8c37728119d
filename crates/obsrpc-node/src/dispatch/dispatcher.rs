use std::sync::Arc;

use async_trait::async_trait;
use obsrpc_core::protocol::ids::{PROTO_SYSTEM, SYSTEM_COMMAND_INSPECT, SYSTEM_COMMAND_REGISTER};
use obsrpc_core::protocol::Packet;
use obsrpc_core::{ErrorCode, Status};
use serde::Serialize;

use super::table::{Command, CommandTable};
use crate::health::{Health, Monitored};
use crate::registry::ServiceRegistry;

/// Row of the `/objects` listing.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectView {
    pub name: String,
    pub index: u16,
    pub health: Health,
}

/// What the server loop needs from a service.
#[async_trait]
pub trait Dispatch: Send + Sync {
    fn name(&self) -> &str;
    fn protocol(&self) -> u16;

    /// Handle one request in place. The packet always leaves as a well-formed
    /// reply: `errorcode` set, `length` zero on failure.
    async fn dispatch(&self, packet: &mut Packet);

    /// Inspect every registered object once.
    async fn inspect_all(&self);

    fn objects(&self) -> Vec<ObjectView>;
}

pub struct Service<T> {
    name: String,
    protocol: u16,
    registry: Arc<ServiceRegistry<T>>,
    table: CommandTable<T>,
}

impl<T: Monitored + 'static> Service<T> {
    pub fn new(
        name: impl Into<String>,
        protocol: u16,
        registry: Arc<ServiceRegistry<T>>,
        table: CommandTable<T>,
    ) -> Self {
        Self {
            name: name.into(),
            protocol,
            registry,
            table,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry<T>> {
        &self.registry
    }

    async fn handle(&self, packet: &mut Packet) -> Status {
        let protocol = packet.protocol();
        if protocol != self.protocol && protocol != PROTO_SYSTEM {
            tracing::debug!(
                service = %self.name,
                protocol,
                expected = self.protocol,
                "protocol mismatch"
            );
            return Err(ErrorCode::ProtocolWrong);
        }

        let command = packet.command();
        let Some(entry) = self.table.get(command) else {
            tracing::debug!(service = %self.name, command, "unknown command");
            return Err(ErrorCode::BadCommand);
        };

        match entry {
            Command::Lookup => {
                let index = self.index_from_name(packet)?;
                packet.set_index(index);
                packet.clear_payload();
                Ok(())
            }
            // REGISTER keeps its timeout where the inline name would go, so
            // system commands address objects by index only.
            Command::Object(_) if packet.index() == 0 && is_system_command(command) => {
                tracing::debug!(service = %self.name, command, "system command without index");
                Err(ErrorCode::NotFound)
            }
            Command::Object(handler) => {
                let object = self.resolve(packet)?;
                handler.call(&object, packet).await
            }
        }
    }

    /// Index 0 means "look the name up"; the resolved index is written back.
    fn resolve(&self, packet: &mut Packet) -> Result<Arc<T>, ErrorCode> {
        let mut index = packet.index();
        if index == 0 {
            index = self.index_from_name(packet)?;
            packet.set_index(index);
        }
        self.registry.object_by_index(index).ok_or_else(|| {
            tracing::debug!(service = %self.name, index, "no such object");
            ErrorCode::NotFound
        })
    }

    fn index_from_name(&self, packet: &Packet) -> Result<u16, ErrorCode> {
        let name = packet.name().map_err(|e| e.error_code())?;
        self.registry.index_by_name(name).map_err(|_| {
            tracing::debug!(service = %self.name, name, "name not registered");
            ErrorCode::NotFound
        })
    }
}

fn is_system_command(command: u16) -> bool {
    command == SYSTEM_COMMAND_INSPECT || command == SYSTEM_COMMAND_REGISTER
}

#[async_trait]
impl<T: Monitored + 'static> Dispatch for Service<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> u16 {
        self.protocol
    }

    async fn dispatch(&self, packet: &mut Packet) {
        match self.handle(packet).await {
            Ok(()) => packet.set_errorcode(0),
            Err(code) => {
                packet.set_errorcode(code.as_u16());
                packet.clear_payload();
            }
        }
    }

    async fn inspect_all(&self) {
        for e in self.registry.entries() {
            if let Err(code) = e.object.inspect().await {
                tracing::warn!(service = %self.name, object = %e.name, index = e.index, %code, "inspection failed");
            }
        }
    }

    fn objects(&self) -> Vec<ObjectView> {
        self.registry
            .entries()
            .into_iter()
            .map(|e| ObjectView {
                health: e.object.health(),
                name: e.name,
                index: e.index,
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::future::BoxFuture;
    use obsrpc_core::protocol::ids::PROTO_AWS;

    use super::*;
    use crate::health::HealthMonitor;

    const GET_TEMPERATURE: u16 = 1;
    const GET_INDEX_BY_NAME: u16 = 23;

    struct Station {
        celsius: f64,
        health: HealthMonitor,
    }

    #[async_trait]
    impl Monitored for Station {
        fn health_monitor(&self) -> &HealthMonitor {
            &self.health
        }
        async fn inspect(&self) -> Status {
            self.health.inspect(std::iter::empty()).await
        }
    }

    fn temperature<'a>(s: &'a Station, p: &'a mut Packet) -> BoxFuture<'a, Status> {
        Box::pin(async move {
            p.set_df0(s.celsius);
            Ok(())
        })
    }

    fn service() -> Service<Station> {
        let registry = ServiceRegistry::build([
            ("north", Station { celsius: 4.5, health: HealthMonitor::new() }),
            ("south", Station { celsius: 7.0, health: HealthMonitor::new() }),
        ])
        .unwrap();
        let table = CommandTable::new().on(GET_TEMPERATURE, temperature).lookup(GET_INDEX_BY_NAME);
        Service::new("aws", PROTO_AWS, Arc::new(registry), table)
    }

    fn request(protocol: u16, command: u16, index: u16) -> Packet {
        let mut p = Packet::new();
        p.set_protocol(protocol);
        p.set_command(command);
        p.set_index(index);
        p
    }

    #[tokio::test]
    async fn foreign_protocol_is_rejected_without_payload() {
        let svc = service();
        let mut p = request(6, GET_TEMPERATURE, 1);
        p.set_buffer(b"leftover").unwrap();
        svc.dispatch(&mut p).await;
        assert_eq!(p.errorcode(), ErrorCode::ProtocolWrong.as_u16());
        assert_eq!(p.length(), 0);
        assert_eq!(p.df0(), 0.0);
    }

    #[tokio::test]
    async fn unknown_command_is_ebadcmd() {
        let svc = service();
        let mut p = request(PROTO_AWS, 99, 1);
        svc.dispatch(&mut p).await;
        assert_eq!(p.errorcode(), ErrorCode::BadCommand.as_u16());
        assert_eq!(p.length(), 0);
    }

    #[tokio::test]
    async fn index_zero_resolves_by_name() {
        let svc = service();
        let mut p = request(PROTO_AWS, GET_TEMPERATURE, 0);
        p.set_name("south").unwrap();
        svc.dispatch(&mut p).await;
        assert_eq!(p.errorcode(), 0);
        assert_eq!(p.index(), 2);
        assert_eq!(p.df0(), 7.0);
    }

    #[tokio::test]
    async fn unresolvable_objects_are_not_found() {
        let svc = service();
        let mut p = request(PROTO_AWS, GET_TEMPERATURE, 0);
        p.set_name("west").unwrap();
        svc.dispatch(&mut p).await;
        assert_eq!(p.errorcode(), ErrorCode::NotFound.as_u16());

        let mut p = request(PROTO_AWS, GET_TEMPERATURE, 9);
        svc.dispatch(&mut p).await;
        assert_eq!(p.errorcode(), ErrorCode::NotFound.as_u16());
    }

    #[tokio::test]
    async fn lookup_answers_with_index_only() {
        let svc = service();
        let mut p = request(PROTO_AWS, GET_INDEX_BY_NAME, 0);
        p.set_name("a-station-name-longer-than-the-slot").unwrap();
        svc.dispatch(&mut p).await;
        assert_eq!(p.errorcode(), ErrorCode::NotFound.as_u16());

        let mut p = request(PROTO_AWS, GET_INDEX_BY_NAME, 0);
        p.set_name("north").unwrap();
        svc.dispatch(&mut p).await;
        assert_eq!((p.errorcode(), p.index(), p.length()), (0, 1, 0));
    }

    #[tokio::test]
    async fn system_protocol_reaches_inspect() {
        let svc = service();
        assert_eq!(svc.objects()[0].health, Health::Error);
        let mut p = request(PROTO_SYSTEM, SYSTEM_COMMAND_INSPECT, 1);
        svc.dispatch(&mut p).await;
        assert_eq!(p.errorcode(), 0);
        assert_eq!(svc.objects()[0].health, Health::Ok);
        assert_eq!(svc.objects()[1].health, Health::Error);
    }

    #[tokio::test]
    async fn system_commands_need_an_index() {
        let svc = service();
        for command in [SYSTEM_COMMAND_INSPECT, SYSTEM_COMMAND_REGISTER] {
            let mut p = request(PROTO_SYSTEM, command, 0);
            p.set_name("north").unwrap();
            svc.dispatch(&mut p).await;
            assert_eq!(p.errorcode(), ErrorCode::NotFound.as_u16());
            assert_eq!(p.index(), 0);
        }
        assert_eq!(svc.objects()[0].health, Health::Error);
    }
}
