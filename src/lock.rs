/*
 *  lock.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Blocking and bounded-wait mutex acquisition
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Budget for the render path before it gives up on a redraw
pub const RENDER_LOCK_WINDOW: Duration = Duration::from_millis(2);
const LOCK_RETRY_NAP: Duration = Duration::from_micros(100);

/// Producer/control side: always waits. The guarded data is plain buffers,
/// so a panic elsewhere does not make it unusable.
#[inline]
pub fn lock_blocking<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Never blocks past `window`: quick try loop, None when the lock stayed busy.
pub fn lock_best_effort<T>(m: &Mutex<T>, window: Duration) -> Option<MutexGuard<'_, T>> {
    let deadline = Instant::now() + window;
    loop {
        match m.try_lock() {
            Ok(guard) => return Some(guard),
            Err(TryLockError::Poisoned(p)) => return Some(p.into_inner()),
            Err(TryLockError::WouldBlock) => {}
        }
        if Instant::now() >= deadline {
            return None;
        }
        // short nap yields CPU to the holder
        sleep(LOCK_RETRY_NAP);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn test_free_lock_is_taken_immediately() {
        let m = Mutex::new(5);
        let g = lock_best_effort(&m, Duration::ZERO).unwrap();
        assert_eq!(*g, 5);
    }

    #[test]
    fn test_busy_lock_times_out() {
        let m = Arc::new(Mutex::new(0));
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let m2 = Arc::clone(&m);
        let holder = thread::spawn(move || {
            let _g = m2.lock().unwrap();
            held_tx.send(()).unwrap();
            release_rx.recv().ok();
        });
        held_rx.recv().unwrap();

        let t0 = Instant::now();
        assert!(lock_best_effort(&m, Duration::from_millis(5)).is_none());
        assert!(t0.elapsed() < Duration::from_secs(1));

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert!(lock_best_effort(&m, RENDER_LOCK_WINDOW).is_some());
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let m = Arc::new(Mutex::new(1));
        let m2 = Arc::clone(&m);
        let _ = thread::spawn(move || {
            let _g = m2.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(m.is_poisoned());
        assert_eq!(*lock_blocking(&m), 1);
        assert_eq!(*lock_best_effort(&m, Duration::ZERO).unwrap(), 1);
    }
}
