use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::os::unix::ffi::OsStrExt;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Engine, EngineStatus, ReadRequest};
use crate::error::{Result, SnapshotError};

const FORMATS: &[&str] = &[
    "phantom", "gadget", "gadget_hdf5", "ndspmhd", "sphng", "magma", "seren", "dragon",
    "vine", "tipsy", "srosph", "ascii",
];

#[link(name = "read")]
extern "C" {
    fn read_data(
        filename: *const c_char,
        fileformat: *const c_char,
        f_length: *mut c_int,
        ff_length: *mut c_int,
        sph_dat: *mut f64,
        npart: *mut c_int,
        ncol: *mut c_int,
        read_header: *mut c_int,
        verbose: *mut c_int,
        ierr: *mut c_int,
    );
    fn get_labels_c(labels: *mut c_char, ncol: *mut c_int);
    fn get_header_vals_size(ntags: *mut c_int, nvals: *mut c_int);
    fn get_headers(tags: *mut c_char, vals: *mut f64, ntags: *mut c_int, nvals: *mut c_int);
}

static IN_USE: AtomicBool = AtomicBool::new(false);

// ---------------------------------------------------------------------------
// SplashLib
// ---------------------------------------------------------------------------

/// Handle to SPLASH's native `libread`.
///
/// The library keeps the last file's labels and header in global state, so
/// at most one handle exists per process. Dropping it releases the slot.
#[derive(Debug)]
pub struct SplashLib {
    /// Saved stdout while diagnostics are redirected to `/dev/null`.
    saved_stdout: Option<c_int>,
}

impl SplashLib {
    /// Take the process-wide handle.
    pub fn acquire() -> Result<Self> {
        IN_USE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SnapshotError::EngineUnavailable)?;
        log::debug!("native read library acquired");
        Ok(Self { saved_stdout: None })
    }

    fn silence(&mut self) -> bool {
        if self.saved_stdout.is_some() {
            return true;
        }
        // SAFETY: plain descriptor juggling on fd 1; every descriptor opened
        // here is either kept in `saved_stdout` or closed.
        unsafe {
            libc::fflush(std::ptr::null_mut());
            let saved = libc::dup(libc::STDOUT_FILENO);
            if saved < 0 {
                return false;
            }
            let null = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
            if null < 0 {
                libc::close(saved);
                return false;
            }
            libc::dup2(null, libc::STDOUT_FILENO);
            libc::close(null);
            self.saved_stdout = Some(saved);
        }
        true
    }

    fn restore(&mut self) {
        if let Some(saved) = self.saved_stdout.take() {
            // SAFETY: `saved` came from `dup` in `silence` and is closed once.
            unsafe {
                libc::fflush(std::ptr::null_mut());
                libc::dup2(saved, libc::STDOUT_FILENO);
                libc::close(saved);
            }
        }
    }
}

impl Drop for SplashLib {
    fn drop(&mut self) {
        self.restore();
        IN_USE.store(false, Ordering::Release);
    }
}

fn to_c(n: usize) -> Option<c_int> {
    c_int::try_from(n).ok()
}

fn from_c(n: c_int) -> usize {
    usize::try_from(n).unwrap_or(0)
}

impl Engine for SplashLib {
    fn read_data(
        &mut self,
        request: &ReadRequest,
        buffer: &mut [f64],
        npart: &mut usize,
        ncol: &mut usize,
    ) -> EngineStatus {
        let Ok(path) = CString::new(request.path.as_os_str().as_bytes()) else {
            return EngineStatus::FAILED;
        };
        let Ok(format) = CString::new(request.format.as_bytes()) else {
            return EngineStatus::FAILED;
        };
        let (Some(mut f_length), Some(mut ff_length)) =
            (to_c(path.as_bytes().len()), to_c(format.as_bytes().len()))
        else {
            return EngineStatus::FAILED;
        };
        let (Some(mut np), Some(mut nc)) = (to_c(*npart), to_c(*ncol)) else {
            return EngineStatus::FAILED;
        };
        if !request.header_only && buffer.len() != from_c(np) * from_c(nc) {
            return EngineStatus::FAILED;
        }
        let mut read_header = c_int::from(request.header_only);
        let mut verbose = c_int::from(request.verbose);
        let mut ierr: c_int = 0;

        // SAFETY: string pointers outlive the call; the buffer holds
        // npart * ncol values whenever the library writes to it.
        unsafe {
            read_data(
                path.as_ptr(),
                format.as_ptr(),
                &mut f_length,
                &mut ff_length,
                buffer.as_mut_ptr(),
                &mut np,
                &mut nc,
                &mut read_header,
                &mut verbose,
                &mut ierr,
            );
        }
        *npart = from_c(np);
        *ncol = from_c(nc);
        EngineStatus(ierr)
    }

    fn labels(&mut self, block: &mut [u8], ncol: usize) -> EngineStatus {
        let Some(mut n) = to_c(ncol) else {
            return EngineStatus::FAILED;
        };
        // SAFETY: `block` is ncol × label width bytes, sized by the caller.
        unsafe { get_labels_c(block.as_mut_ptr().cast(), &mut n) };
        EngineStatus::OK
    }

    fn header_sizes(&mut self, ntags: &mut usize, nvals: &mut usize) -> EngineStatus {
        let (mut t, mut v): (c_int, c_int) = (0, 0);
        // SAFETY: two scalar out-parameters.
        unsafe { get_header_vals_size(&mut t, &mut v) };
        *ntags = from_c(t);
        *nvals = from_c(v);
        EngineStatus::OK
    }

    fn headers(&mut self, tags: &mut [u8], values: &mut [f64]) -> EngineStatus {
        let tag_count = tags.len() / crate::read::codec::TAG_WIDTH;
        let (Some(mut t), Some(mut v)) = (to_c(tag_count), to_c(values.len())) else {
            return EngineStatus::FAILED;
        };
        // SAFETY: both arrays were sized from `get_header_vals_size`.
        unsafe { get_headers(tags.as_mut_ptr().cast(), values.as_mut_ptr(), &mut t, &mut v) };
        EngineStatus::OK
    }

    fn set_quiet(&mut self, quiet: bool) -> bool {
        let previous = self.saved_stdout.is_some();
        if quiet {
            if !self.silence() {
                log::warn!("could not redirect native output; diagnostics stay visible");
            }
        } else {
            self.restore();
        }
        previous
    }

    fn supports_format(&self, format: &str) -> bool {
        FORMATS.iter().any(|f| f.eq_ignore_ascii_case(format))
    }

    fn formats(&self) -> &[&'static str] {
        FORMATS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test: the handle is process-wide and tests run in parallel.
    #[test]
    fn handle_is_exclusive_and_quiet_mode_round_trips() {
        let mut lib = SplashLib::acquire().unwrap();
        assert!(matches!(SplashLib::acquire(), Err(SnapshotError::EngineUnavailable)));

        assert!(!lib.set_quiet(true));
        assert!(lib.set_quiet(true));
        assert!(lib.set_quiet(false));
        assert!(!lib.set_quiet(false));

        drop(lib);
        assert!(SplashLib::acquire().is_ok());
    }
}
