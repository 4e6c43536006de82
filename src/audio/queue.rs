use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serenity::model::id::UserId;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::{
    error::{MusicError, MusicResult},
    sources::Track,
};

static NEXT_SONG_ID: AtomicU64 = AtomicU64::new(1);

/// Identidad de una canción encolada, única en el proceso
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SongId(u64);

/// Un track junto a quien lo pidió
#[derive(Debug, Clone)]
pub struct Song {
    id: SongId,
    track: Arc<Track>,
    requested_by: UserId,
    added_at: DateTime<Utc>,
}

impl Song {
    pub fn new(track: Track, requested_by: UserId) -> Self {
        Self {
            id: SongId(NEXT_SONG_ID.fetch_add(1, Ordering::Relaxed)),
            track: Arc::new(track),
            requested_by,
            added_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SongId {
        self.id
    }
    pub fn track(&self) -> &Track {
        &self.track
    }
    pub fn title(&self) -> &str {
        self.track.title()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.track.duration()
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Cola FIFO de canciones de una sesión.
///
/// Es a la vez una cola bloqueante (`dequeue` espera hasta que haya una
/// canción) y una lista indexable que se puede rotar, mezclar y recortar.
/// El lock interno nunca se mantiene a través de un `.await`.
#[derive(Debug)]
pub struct SongQueue {
    items: Mutex<VecDeque<Song>>,
    available: Notify,
    max_size: usize,
}

impl SongQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            max_size,
        }
    }

    /// Agrega una canción al final y devuelve su posición (base 0)
    pub fn enqueue(&self, song: Song) -> MusicResult<usize> {
        let position = {
            let mut items = self.items.lock();
            if items.len() >= self.max_size {
                return Err(MusicError::QueueFull(self.max_size));
            }
            debug!("➕ Agregado a la cola: {}", song.title());
            items.push_back(song);
            items.len() - 1
        };

        self.available.notify_one();
        Ok(position)
    }

    /// Espera hasta que haya una canción y la saca del frente
    pub async fn dequeue(&self) -> Song {
        loop {
            if let Some(song) = self.try_dequeue() {
                return song;
            }
            // notify_one guarda un permiso si nadie espera, no se pierden avisos
            self.available.notified().await;
        }
    }

    fn try_dequeue(&self) -> Option<Song> {
        self.items.lock().pop_front()
    }

    pub fn get(&self, index: usize) -> Option<Song> {
        self.items.lock().get(index).cloned()
    }

    /// Copia de `[start, end)`, recortado a la longitud actual
    pub fn slice(&self, start: usize, end: usize) -> Vec<Song> {
        let items = self.items.lock();
        let end = end.min(items.len());
        if start >= end {
            return Vec::new();
        }
        items.range(start..end).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<Song> {
        self.items.lock().iter().cloned().collect()
    }

    pub fn position(&self, id: SongId) -> Option<usize> {
        self.items.lock().iter().position(|song| song.id() == id)
    }

    pub fn contains(&self, id: SongId) -> bool {
        self.position(id).is_some()
    }

    /// Elimina la canción en `index`, desplazando las siguientes
    pub fn remove(&self, index: usize) -> MusicResult<Song> {
        let mut items = self.items.lock();
        let len = items.len();
        let song = items
            .remove(index)
            .ok_or(MusicError::IndexOutOfRange { index, len })?;
        debug!("❌ Track eliminado en posición {}", index);
        Ok(song)
    }

    /// Rota la cola para que el elemento en `offset` quede primero.
    ///
    /// Un offset negativo cuenta desde el final.
    pub fn rotate(&self, offset: isize) {
        let mut items = self.items.lock();
        let len = items.len();
        if len == 0 {
            return;
        }
        let shift = offset.rem_euclid(len as isize) as usize;
        items.rotate_left(shift);
        debug!("🔄 Cola rotada {} posiciones", shift);
    }

    /// Valida `index` y rota para que esa canción sea la siguiente,
    /// en una sola operación atómica.
    pub fn promote(&self, index: usize) -> MusicResult<()> {
        let mut items = self.items.lock();
        let len = items.len();
        if index >= len {
            return Err(MusicError::InvalidIndex { index, len });
        }
        items.rotate_left(index);
        debug!("⏫ Canción en posición {} promovida", index);
        Ok(())
    }

    /// Mezcla la cola (Fisher-Yates)
    pub fn shuffle(&self) {
        let mut items = self.items.lock();
        items.make_contiguous().shuffle(&mut rand::thread_rng());
        info!("🔀 Cola mezclada");
    }

    /// Vacía la cola y devuelve cuántas canciones se quitaron
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let removed = items.len();
        items.clear();
        info!("🗑️ Cola limpiada ({} canciones)", removed);
        removed
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.lock().len() >= self.max_size
    }

    /// Obtiene una página de la cola (páginas base 1)
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items = self.items.lock();
        let total_items = items.len();
        let items_per_page = items_per_page.max(1);
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(items_per_page)
        };
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(total_items);

        QueuePage {
            items: (start..end).zip(items.range(start..end).cloned()).collect(),
            current_page,
            total_pages,
            total_items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    /// (posición base 0, canción)
    pub items: Vec<(usize, Song)>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Tiempo estimado hasta que suene `target`.
///
/// Suma la duración de la canción actual y de todas las que están antes
/// en la cola. Cualquier duración desconocida (directo) vuelve el
/// resultado desconocido (`Ok(None)`). Si `target` ya no está en la cola
/// devuelve `NotInQueue`: quien llama tiene una referencia vieja.
pub fn estimate_wait(
    current: Option<&Song>,
    queue: &[Song],
    target: SongId,
) -> MusicResult<Option<Duration>> {
    let index = queue
        .iter()
        .position(|song| song.id() == target)
        .ok_or(MusicError::NotInQueue)?;

    let mut total = Duration::ZERO;
    for song in current.into_iter().chain(&queue[..index]) {
        match song.duration() {
            Some(duration) => total += duration,
            None => return Ok(None),
        }
    }

    Ok(Some(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::song;
    use pretty_assertions::assert_eq;

    fn titles(songs: &[Song]) -> Vec<String> {
        songs.iter().map(|s| s.title().to_string()).collect()
    }

    fn filled(names: &[&str]) -> SongQueue {
        let queue = SongQueue::new(100);
        for name in names {
            queue.enqueue(song(name, 60)).unwrap();
        }
        queue
    }

    #[tokio::test]
    async fn test_dequeue_is_fifo() {
        let queue = filled(&["a", "b", "c", "d"]);

        let mut out = Vec::new();
        for _ in 0..4 {
            out.push(queue.dequeue().await.title().to_string());
        }
        assert_eq!(out, vec!["a", "b", "c", "d"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let queue = Arc::new(SongQueue::new(10));

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        queue.enqueue(song("late", 30)).unwrap();
        let got = waiter.await.unwrap();
        assert_eq!(got.title(), "late");
    }

    #[tokio::test]
    async fn test_rotate_then_dequeue_yields_element_at_offset() {
        let names = ["a", "b", "c", "d", "e"];
        for k in 0..names.len() {
            let queue = filled(&names);
            queue.rotate(k as isize);
            assert_eq!(queue.dequeue().await.title(), names[k]);
        }
    }

    #[test]
    fn test_rotate_negative_and_empty() {
        let queue = filled(&["a", "b", "c"]);
        queue.rotate(-1);
        assert_eq!(titles(&queue.snapshot()), vec!["c", "a", "b"]);

        let empty = SongQueue::new(10);
        empty.rotate(3);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_promote_keeps_relative_order() {
        let queue = filled(&["a", "b", "c"]);
        queue.promote(2).unwrap();
        assert_eq!(titles(&queue.snapshot()), vec!["c", "a", "b"]);

        assert_eq!(
            queue.promote(3),
            Err(MusicError::InvalidIndex { index: 3, len: 3 })
        );
    }

    #[test]
    fn test_remove_shifts_and_checks_bounds() {
        let queue = filled(&["a", "b", "c"]);
        let removed = queue.remove(1).unwrap();
        assert_eq!(removed.title(), "b");
        assert_eq!(titles(&queue.snapshot()), vec!["a", "c"]);

        assert_eq!(
            queue.remove(2).unwrap_err(),
            MusicError::IndexOutOfRange { index: 2, len: 2 }
        );
    }

    #[test]
    fn test_shuffle_keeps_every_song() {
        let queue = filled(&["a", "b", "c", "d", "e", "f"]);
        queue.shuffle();
        let mut after = titles(&queue.snapshot());
        after.sort();
        assert_eq!(after, vec!["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn test_position_slice_and_clear() {
        let queue = filled(&["a", "b", "c"]);
        let b = queue.get(1).unwrap();
        assert_eq!(queue.position(b.id()), Some(1));
        assert!(queue.contains(b.id()));
        assert_eq!(titles(&queue.slice(1, 10)), vec!["b", "c"]);
        assert!(queue.slice(5, 10).is_empty());

        assert_eq!(queue.clear(), 3);
        assert_eq!(queue.position(b.id()), None);
        assert!(queue.get(0).is_none());
    }

    #[test]
    fn test_enqueue_respects_max_size() {
        let queue = SongQueue::new(2);
        assert_eq!(queue.enqueue(song("a", 1)).unwrap(), 0);
        assert!(!queue.is_full());
        assert_eq!(queue.enqueue(song("b", 1)).unwrap(), 1);
        assert!(queue.is_full());
        assert_eq!(queue.enqueue(song("c", 1)), Err(MusicError::QueueFull(2)));
    }

    #[test]
    fn test_page_bounds() {
        let queue = filled(&["a", "b", "c", "d", "e"]);
        let page = queue.page(2, 2);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 2);
        assert_eq!(
            page.items.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![2, 3]
        );

        // Páginas fuera de rango se recortan
        assert_eq!(queue.page(99, 2).current_page, 3);
        assert_eq!(SongQueue::new(5).page(0, 10).total_pages, 1);
    }

    #[test]
    fn test_eta_unknown_duration_poisons_following_songs() {
        let a = song("a", 120);
        let b = song("b", 0);
        let c = song("c", 90);
        let queue = vec![a.clone(), b.clone(), c.clone()];

        assert_eq!(estimate_wait(None, &queue, a.id()), Ok(Some(Duration::ZERO)));
        assert_eq!(
            estimate_wait(None, &queue, b.id()),
            Ok(Some(Duration::from_secs(120)))
        );
        assert_eq!(estimate_wait(None, &queue, c.id()), Ok(None));
    }

    #[test]
    fn test_eta_includes_current_song() {
        let current = song("now", 200);
        let a = song("a", 100);
        let queue = vec![a.clone()];
        assert_eq!(
            estimate_wait(Some(&current), &queue, a.id()),
            Ok(Some(Duration::from_secs(200)))
        );

        let live = song("radio", 0);
        assert_eq!(estimate_wait(Some(&live), &queue, a.id()), Ok(None));
    }

    #[test]
    fn test_eta_for_missing_song_is_stale_reference() {
        let gone = song("gone", 10);
        let queue = vec![song("a", 10)];
        assert_eq!(
            estimate_wait(None, &queue, gone.id()),
            Err(MusicError::NotInQueue)
        );
    }
}
