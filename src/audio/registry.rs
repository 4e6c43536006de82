use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Weak,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{
    session::{Session, SessionEvent, SessionSettings},
    voice::VoiceGateway,
};

/// Mapa global guild → sesión.
///
/// `get_or_create` es atómico por guild: el `entry` de DashMap mantiene el
/// lock del shard mientras se construye la sesión y se lanza su driver.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<Session>>,
    gateway: Arc<dyn VoiceGateway>,
    settings: SessionSettings,
    events: broadcast::Sender<SessionEvent>,
    drivers_spawned: AtomicUsize,
    me: Weak<SessionRegistry>,
}

impl SessionRegistry {
    pub fn new(gateway: Arc<dyn VoiceGateway>, settings: SessionSettings) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new_cyclic(|me| Self {
            sessions: DashMap::new(),
            gateway,
            settings,
            events,
            drivers_spawned: AtomicUsize::new(0),
            me: me.clone(),
        })
    }

    /// Eventos de todas las sesiones para la capa de presentación
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Session>> {
        self.sessions.get(&guild_id).map(|session| session.clone())
    }

    /// Devuelve la sesión de la guild o crea una nueva con su driver.
    ///
    /// Una sesión que ya se está deteniendo se reemplaza; su teardown no
    /// borra la nueva (ver [`SessionRegistry::remove_if_same`]).
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<Session> {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(entry) if !entry.get().is_stopping() => entry.get().clone(),
            Entry::Occupied(mut entry) => {
                debug!("♻️ Reemplazando sesión que se detiene en guild {}", guild_id);
                let session = self.spawn_session(guild_id);
                entry.insert(session.clone());
                session
            }
            Entry::Vacant(entry) => entry.insert(self.spawn_session(guild_id)).clone(),
        }
    }

    fn spawn_session(&self, guild_id: GuildId) -> Arc<Session> {
        let session = Session::new(
            guild_id,
            self.gateway.clone(),
            self.settings,
            self.events.clone(),
            self.me.clone(),
        );
        session.start();
        self.drivers_spawned.fetch_add(1, Ordering::Relaxed);
        info!("🆕 Sesión creada para guild {}", guild_id);
        session
    }

    /// Quita la entrada sin detener la sesión; quien llama ya la detuvo
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<Session>> {
        self.sessions.remove(&guild_id).map(|(_, session)| session)
    }

    /// Quita la entrada sólo si sigue apuntando a `session`
    pub fn remove_if_same(&self, guild_id: GuildId, session: &Session) -> bool {
        self.sessions
            .remove_if(&guild_id, |_, current| std::ptr::eq(Arc::as_ptr(current), session))
            .is_some()
    }

    /// Detiene la sesión de la guild (si existe) y espera su teardown
    pub async fn leave(&self, guild_id: GuildId) -> bool {
        let Some(session) = self.get(guild_id) else {
            return false;
        };
        session.stop().await;
        self.remove_if_same(guild_id, &session);
        true
    }

    /// Detiene todas las sesiones (apagado del proceso)
    pub async fn shutdown_all(&self) {
        let sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        info!("🛑 Deteniendo {} sesiones", sessions.len());
        for session in sessions {
            session.stop().await;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn drivers_spawned(&self) -> usize {
        self.drivers_spawned.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{channel, guild, settle, FakeGateway};

    fn registry() -> Arc<SessionRegistry> {
        SessionRegistry::new(Arc::new(FakeGateway::default()), SessionSettings::default())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_builds_one_session() {
        let registry = registry();
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    registry.get_or_create(guild())
                })
            })
            .collect();

        let mut sessions = Vec::new();
        for task in tasks {
            sessions.push(task.await.unwrap());
        }

        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.drivers_spawned(), 1);

        registry.shutdown_all().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_leave_removes_entry() {
        let registry = registry();
        let session = registry.get_or_create(guild());
        session.join(channel(1)).await.unwrap();
        settle().await;

        assert!(registry.leave(guild()).await);
        assert!(registry.get(guild()).is_none());
        assert!(session.is_stopping());
        assert!(!registry.leave(guild()).await);
    }

    #[tokio::test]
    async fn test_stopping_session_is_replaced() {
        let registry = registry();
        let old = registry.get_or_create(guild());
        old.stop().await;

        let fresh = registry.get_or_create(guild());
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert!(!registry.remove_if_same(guild(), &old));
        assert!(Arc::ptr_eq(&registry.get(guild()).unwrap(), &fresh));
        assert_eq!(registry.drivers_spawned(), 2);
    }
}
