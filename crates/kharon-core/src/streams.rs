//! Fixed-rate sensor streams (C8): resamples an irregularly-reported
//! vector source (gyro) onto exact 100 Hz / 10 ms boundaries in a ring
//! buffer, and a simple latest-value store for sources that don't need
//! resampling (accelerometer, magnetometer).
//!
//! Grounded on `core_modules/attitude/imu_streams.c` / `imu_streams.h`,
//! including its unit tests, which are ported below verbatim in
//! behavior (renamed away from the original's C identifiers).

pub const SAMPLE_FREQ_HZ: u64 = 100;
pub const SAMPLE_DUR_USEC: u64 = 1_000_000 / SAMPLE_FREQ_HZ;
pub const SAMPLE_DUR_SEC: f64 = SAMPLE_DUR_USEC as f64 * 1.0e-6;
/// Must be a power of two: the ring index is wrapped with a bitmask.
pub const RESAMPLE_QUEUE_LEN: usize = 2048;

pub type Vector3 = [f64; 3];

/// Stores only the most recently reported sample; used for sources that
/// report faster than needed and where the freshest value is what
/// matters (accelerometer, magnetometer).
#[derive(Debug, Clone, Copy)]
pub struct SimpleVectorStream {
    pub timestamp_usec: u64,
    pub sample: Vector3,
    pub priority: i8,
}

impl SimpleVectorStream {
    pub fn new(priority: i8) -> Self {
        SimpleVectorStream {
            timestamp_usec: 0,
            sample: [0.0; 3],
            priority,
        }
    }

    pub fn update(&mut self, val: Vector3, t_sec: f64) {
        self.timestamp_usec = (t_sec * 1.0e6) as u64;
        self.sample = val;
    }
}

/// Resamples an irregular vector input onto fixed 10 ms boundaries. Each
/// published sample is the time-weighted average of whatever inputs
/// overlapped that boundary, queued in a power-of-two ring so it can
/// run arbitrarily far ahead of the reader.
pub struct ResampledVectorStream {
    resampled: Vec<Vector3>,
    read_queue_idx: usize,
    write_queue_idx: usize,
    write_pos_dur: f64,
    read_sample_usec: u64,
    write_sample_usec: u64,
    read_sample_sec: f64,
    write_sample_sec: f64,
    pub priority: i8,
}

impl ResampledVectorStream {
    pub fn new(priority: i8) -> Self {
        ResampledVectorStream {
            resampled: vec![[0.0; 3]; RESAMPLE_QUEUE_LEN],
            read_queue_idx: 0,
            write_queue_idx: 0,
            write_pos_dur: 0.0,
            read_sample_usec: 0,
            write_sample_usec: 0,
            read_sample_sec: 0.0,
            write_sample_sec: -1.0,
            priority,
        }
    }

    fn add_first_sample(&mut self, val: Vector3, t: f64) {
        let mut sample_start_usec = (t * 1.0e6) as u64;
        sample_start_usec = (sample_start_usec / SAMPLE_DUR_USEC) * SAMPLE_DUR_USEC;
        let sample_start_sec = sample_start_usec as f64 * 1.0e-6;
        let sample_end_usec = sample_start_usec + SAMPLE_DUR_USEC;
        let sample_end_sec = sample_end_usec as f64 * 1.0e-6;
        self.read_sample_usec = sample_end_usec;
        self.read_sample_sec = sample_end_sec;
        self.write_sample_usec = sample_end_usec;
        self.write_sample_sec = sample_end_sec;

        let dt = t - sample_start_sec;
        let wt = dt / SAMPLE_DUR_SEC;
        self.read_queue_idx = 0;
        self.write_queue_idx = 0;
        for i in 0..3 {
            self.resampled[0][i] = val[i] * wt;
        }
        self.write_pos_dur = dt;
    }

    fn advance_read_position(&mut self) {
        self.read_queue_idx = (self.read_queue_idx + 1) & (RESAMPLE_QUEUE_LEN - 1);
        self.read_sample_usec += SAMPLE_DUR_USEC;
        self.read_sample_sec = self.read_sample_usec as f64 * 1.0e-6;
    }

    /// Advances the write index, clearing the *next* write cell. If the
    /// ring has fully wrapped (write has caught up to read) the reader
    /// is forced forward too. This clear-the-next-cell-not-this-one
    /// ordering matches the original exactly.
    fn publish(&mut self) {
        let idx = (self.write_queue_idx + 1) & (RESAMPLE_QUEUE_LEN - 1);
        self.write_queue_idx = idx;
        self.write_sample_usec += SAMPLE_DUR_USEC;
        self.write_sample_sec = self.write_sample_usec as f64 * 1.0e-6;
        if self.write_queue_idx == self.read_queue_idx {
            self.advance_read_position();
        }
        self.resampled[idx] = [0.0; 3];
        self.write_pos_dur = 0.0;
    }

    pub fn add_sample(&mut self, val: Vector3, t: f64) {
        if self.write_sample_sec < 0.0 {
            self.add_first_sample(val, t);
            return;
        }
        while t >= self.write_sample_sec {
            let idx = self.write_queue_idx;
            if self.write_pos_dur > 0.0 {
                let dt = SAMPLE_DUR_SEC - self.write_pos_dur;
                let remainder = dt / SAMPLE_DUR_SEC;
                for i in 0..3 {
                    self.resampled[idx][i] += val[i] * remainder;
                }
            } else {
                self.resampled[idx] = val;
            }
            self.publish();
        }
        let idx = self.write_queue_idx;
        let dt = SAMPLE_DUR_SEC - (self.write_sample_sec - t);
        let wt = dt / SAMPLE_DUR_SEC;
        for i in 0..3 {
            self.resampled[idx][i] = val[i] * wt;
        }
        self.write_pos_dur = dt;
    }

    /// Returns the end-of-sample microsecond timestamp if a sample is
    /// queued, or `None` if the reader has caught up to the writer.
    pub fn is_sample_available(&self) -> Option<u64> {
        if self.write_queue_idx == self.read_queue_idx {
            None
        } else {
            Some(self.read_sample_usec)
        }
    }

    /// Pops the next queued sample, returning its end-of-sample time in
    /// seconds, or `None` if none is available.
    pub fn get_next_sample(&mut self) -> Option<(f64, Vector3)> {
        if self.write_queue_idx == self.read_queue_idx {
            return None;
        }
        let data = self.resampled[self.read_queue_idx];
        let t = self.read_sample_sec;
        self.advance_read_position();
        Some((t, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 0.0001;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= EPS
    }
    fn vec_close(a: Vector3, b: Vector3) -> bool {
        (0..3).all(|i| close(a[i], b[i]))
    }

    #[test]
    fn fresh_stream_indicates_no_data() {
        let stream = ResampledVectorStream::new(1);
        assert!(stream.write_sample_sec < 0.0);
    }

    #[test]
    fn init_first_sample_is_weighted_by_remaining_fraction() {
        let mut stream = ResampledVectorStream::new(1);
        let a = [0.1, 0.2, 0.3];
        let t = 100.516;
        stream.add_sample(a, t);
        assert!(close(stream.read_sample_sec, 100.520));
        assert!(close(stream.write_sample_sec, 100.520));
        let expected = [a[0] * 0.6, a[1] * 0.6, a[2] * 0.6];
        assert!(vec_close(stream.resampled[0], expected));
    }

    #[test]
    fn add_sample_straddle_cover_and_full_cover_scenario() {
        let mut stream = ResampledVectorStream::new(1);
        let a = [0.1, 0.2, 0.3];
        let b = [0.5, 0.6, 0.7];
        let ab = [0.2, 0.3, 0.4]; // 1/4 of the way from a to b

        let mut t = 100.5175;
        stream.add_sample(a, t);
        t += SAMPLE_DUR_SEC;
        stream.add_sample(a, t);

        let pub_time = stream.is_sample_available().expect("first sample published");
        assert_eq!(pub_time, 100_520_000);

        let (sec, z) = stream.get_next_sample().expect("sample available");
        let expected_sec = pub_time as f64 * 1.0e-6;
        assert!((sec - expected_sec).abs() < 1e-6);
        assert!(vec_close(z, a));

        t += 2.0 * SAMPLE_DUR_SEC;
        stream.add_sample(b, t);

        let (sec2, z2) = stream.get_next_sample().expect("sample available");
        assert!((sec2 - (expected_sec + SAMPLE_DUR_SEC)).abs() < 1e-6);
        assert!(vec_close(z2, ab));

        let (sec3, z3) = stream.get_next_sample().expect("sample available");
        assert!((sec3 - (expected_sec + 2.0 * SAMPLE_DUR_SEC)).abs() < 1e-6);
        assert!(vec_close(z3, b));
    }

    #[test]
    fn simple_stream_stores_latest_value_and_truncated_microsecond_timestamp() {
        let mut stream = SimpleVectorStream::new(1);
        let a = [0.1, 0.2, 0.3];
        let b = [0.2, 0.3, 0.4];
        stream.update(a, 100.3456789);
        assert_eq!(stream.sample[0], a[0]);
        assert_eq!(stream.timestamp_usec, 100_345_678);
        stream.update(b, 101.0000000001);
        assert_eq!(stream.sample[0], b[0]);
    }
}
