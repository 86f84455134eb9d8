// src/peaks/worker.rs

use super::{PeakError, PeakOptions, PeakSet, slice_peaks};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};

/// Identifies whose peaks a job computes. Playlist track ids are used here.
pub type JobKey = u64;

/// One channel of samples to reduce off the UI thread.
pub struct PeakJob {
    pub key: JobKey,
    pub samples: Vec<f32>,
    pub samples_per_pixel: usize,
    pub bits: u32,
}

impl PeakJob {
    /// Coarse defaults suited to live recordings: 10000 samples per peak at 8 bits.
    pub fn new(key: JobKey, samples: Vec<f32>) -> Self {
        Self { key, samples, samples_per_pixel: 10_000, bits: 8 }
    }

    pub fn with_resolution(mut self, samples_per_pixel: usize) -> Self {
        self.samples_per_pixel = samples_per_pixel;
        self
    }
}

pub struct PeakResult {
    pub key: JobKey,
    pub peaks: Result<PeakSet, PeakError>,
}

/// What to do with a job for a key that already has one in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ThrottlePolicy {
    /// Refuse the new job; the running one finishes and is delivered.
    #[default]
    DropWhileBusy,
    /// Run the new job and discard the older result when it arrives.
    Supersede,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    Dropped,
}

struct Envelope {
    generation: u64,
    job: PeakJob,
}

struct Completed {
    generation: u64,
    result: PeakResult,
}

pub struct PeakWorker {
    jobs: Option<Sender<Envelope>>,
    results: Receiver<Completed>,
    handle: Option<JoinHandle<()>>,
    policy: ThrottlePolicy,
    in_flight: HashMap<JobKey, u64>,
    next_generation: u64,
    // finished while waiting on another key
    ready: Vec<PeakResult>,
}

impl PeakWorker {
    pub fn spawn(policy: ThrottlePolicy) -> Self {
        let (job_tx, job_rx) = channel::<Envelope>();
        let (res_tx, res_rx) = channel::<Completed>();

        let handle = thread::spawn(move || {
            while let Ok(Envelope { generation, job }) = job_rx.recv() {
                let opts = PeakOptions {
                    samples_per_pixel: job.samples_per_pixel,
                    mono: true,
                    cue_in: None,
                    cue_out: None,
                    bits: job.bits,
                };
                let peaks = slice_peaks(&job.samples, opts);
                let done = Completed { generation, result: PeakResult { key: job.key, peaks } };
                if res_tx.send(done).is_err() {
                    break;
                }
            }
            log::debug!("peak worker exiting");
        });

        Self {
            jobs: Some(job_tx),
            results: res_rx,
            handle: Some(handle),
            policy,
            in_flight: HashMap::new(),
            next_generation: 0,
            ready: Vec::new(),
        }
    }

    pub fn policy(&self) -> ThrottlePolicy {
        self.policy
    }

    pub fn is_busy(&self, key: JobKey) -> bool {
        self.in_flight.contains_key(&key)
    }

    pub fn submit(&mut self, job: PeakJob) -> Submission {
        if self.policy == ThrottlePolicy::DropWhileBusy && self.is_busy(job.key) {
            log::trace!("peak job for {} dropped, one already running", job.key);
            return Submission::Dropped;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let key = job.key;

        let sent = self
            .jobs
            .as_ref()
            .map(|tx| tx.send(Envelope { generation, job }).is_ok())
            .unwrap_or(false);

        if sent {
            self.in_flight.insert(key, generation);
            Submission::Accepted
        } else {
            log::warn!("peak worker is gone, job for {key} not run");
            Submission::Dropped
        }
    }

    /// Collects finished jobs without blocking. Superseded results are discarded.
    pub fn poll(&mut self) -> Vec<PeakResult> {
        let mut out = std::mem::take(&mut self.ready);
        loop {
            match self.results.try_recv() {
                Ok(done) => {
                    if self.in_flight.get(&done.result.key) == Some(&done.generation) {
                        self.in_flight.remove(&done.result.key);
                        out.push(done.result);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    /// Blocks until the job for `key` lands. Returns `None` if nothing is in flight for it.
    pub fn wait_for(&mut self, key: JobKey) -> Option<PeakResult> {
        while self.is_busy(key) {
            let done = self.results.recv().ok()?;
            if self.in_flight.get(&done.result.key) == Some(&done.generation) {
                self.in_flight.remove(&done.result.key);
                if done.result.key == key {
                    return Some(done.result);
                }
                self.ready.push(done.result);
            }
        }
        None
    }

    /// Forgets any in-flight job for `key`; its result will be discarded.
    pub fn cancel(&mut self, key: JobKey) {
        self.in_flight.remove(&key);
    }
}

impl Drop for PeakWorker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_key_drops_new_jobs() {
        let mut worker = PeakWorker::spawn(ThrottlePolicy::DropWhileBusy);
        assert_eq!(worker.submit(PeakJob::new(1, vec![0.5; 20_000])), Submission::Accepted);
        assert_eq!(worker.submit(PeakJob::new(1, vec![0.5; 30_000])), Submission::Dropped);
        // other keys are independent
        assert_eq!(worker.submit(PeakJob::new(2, vec![0.5; 10])), Submission::Accepted);

        let first = worker.wait_for(1).unwrap();
        let peaks = first.peaks.unwrap();
        assert_eq!(peaks.length, 2);
        assert!(!worker.is_busy(1));
    }

    #[test]
    fn waiting_on_one_key_keeps_the_others() {
        let mut worker = PeakWorker::spawn(ThrottlePolicy::DropWhileBusy);
        worker.submit(PeakJob::new(4, vec![0.5; 10]));
        worker.submit(PeakJob::new(5, vec![0.5; 30_000]));

        // jobs run in order, so 4 lands before 5
        let waited = worker.wait_for(5).unwrap();
        assert_eq!(waited.key, 5);
        let rest = worker.poll();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].key, 4);
        assert!(!worker.is_busy(4));
    }

    #[test]
    fn supersede_keeps_only_latest() {
        let mut worker = PeakWorker::spawn(ThrottlePolicy::Supersede);
        worker.submit(PeakJob::new(7, vec![0.1; 10_000]));
        worker.submit(PeakJob::new(7, vec![0.1; 50_000]));

        let latest = worker.wait_for(7).unwrap().peaks.unwrap();
        assert_eq!(latest.length, 5);
        // the older result must never surface
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(worker.poll().is_empty());
    }

    #[test]
    fn errors_are_delivered_as_results() {
        let mut worker = PeakWorker::spawn(ThrottlePolicy::DropWhileBusy);
        let mut job = PeakJob::new(3, vec![0.0; 4]);
        job.bits = 24;
        worker.submit(job);
        let res = worker.wait_for(3).unwrap();
        assert_eq!(res.peaks.unwrap_err(), PeakError::InvalidBitDepth(24));
    }
}
