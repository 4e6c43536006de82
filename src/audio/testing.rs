//! Dobles de prueba para la conexión de voz y helpers compartidos.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::oneshot;

use super::{
    queue::Song,
    voice::{Playback, PlaybackEnd, PlaybackHandle, VoiceConnection, VoiceGateway},
};
use crate::{
    error::{MusicError, MusicResult},
    sources::{SourceType, Track},
};

pub fn guild() -> GuildId {
    GuildId::new(42)
}

pub fn channel(id: u64) -> ChannelId {
    ChannelId::new(id)
}

pub fn track(title: &str, secs: u64) -> Track {
    Track::new(
        title.to_string(),
        format!("https://www.youtube.com/watch?v={}", title),
        format!("https://cdn.example.com/{}.opus", title),
        SourceType::YouTube,
    )
    .with_duration(Duration::from_secs(secs))
}

pub fn song(title: &str, secs: u64) -> Song {
    song_by(title, secs, 1)
}

pub fn song_by(title: &str, secs: u64, user: u64) -> Song {
    Song::new(track(title, secs), UserId::new(user))
}

/// Deja correr al driver hasta que se quede esperando
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
pub struct FakeGateway {
    pub connects: AtomicUsize,
    pub fail: AtomicBool,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeGateway {
    pub fn connection(&self, index: usize) -> Arc<FakeConnection> {
        self.connections.lock()[index].clone()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn connect(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn VoiceConnection>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MusicError::Connection("refused".to_string()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let connection = Arc::new(FakeConnection {
            channel_id: Mutex::new(channel_id),
            disconnects: AtomicUsize::new(0),
            playbacks: Mutex::new(Vec::new()),
        });
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }
}

pub struct FakeConnection {
    channel_id: Mutex<ChannelId>,
    pub disconnects: AtomicUsize,
    playbacks: Mutex<Vec<(String, Arc<FakePlayback>)>>,
}

impl FakeConnection {
    pub fn played(&self) -> Vec<String> {
        self.playbacks
            .lock()
            .iter()
            .map(|(title, _)| title.clone())
            .collect()
    }

    pub fn last_playback(&self) -> Arc<FakePlayback> {
        self.playbacks
            .lock()
            .last()
            .map(|(_, playback)| playback.clone())
            .expect("nothing was played")
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn play(&self, track: &Track, volume: f32) -> MusicResult<Playback> {
        let (tx, rx) = oneshot::channel();
        let playback = Arc::new(FakePlayback {
            sender: Mutex::new(Some(tx)),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            volume: Mutex::new(volume),
        });
        self.playbacks
            .lock()
            .push((track.title().to_string(), playback.clone()));

        Ok(Playback {
            handle: Box::new(FakeHandle(playback)),
            finished: rx,
        })
    }

    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()> {
        *self.channel_id.lock() = channel_id;
        Ok(())
    }

    async fn disconnect(&self) -> MusicResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn channel_id(&self) -> ChannelId {
        *self.channel_id.lock()
    }
}

pub struct FakePlayback {
    sender: Mutex<Option<oneshot::Sender<PlaybackEnd>>>,
    pub paused: AtomicBool,
    pub stopped: AtomicBool,
    pub volume: Mutex<f32>,
}

impl FakePlayback {
    /// Simula la señal de fin del pipeline de medios
    pub fn finish(&self, end: PlaybackEnd) {
        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(end);
        }
    }
}

struct FakeHandle(Arc<FakePlayback>);

impl PlaybackHandle for FakeHandle {
    fn pause(&self) -> MusicResult<()> {
        self.0.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> MusicResult<()> {
        self.0.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> MusicResult<()> {
        self.0.stopped.store(true, Ordering::SeqCst);
        self.0.finish(PlaybackEnd::Finished);
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> MusicResult<()> {
        *self.0.volume.lock() = volume;
        Ok(())
    }
}
