use std::io;

use super::config::SessionConfig;
use super::display::DisplaySink;
use super::error::{Result, SioError};
use super::session::{Session, SortStats};

/// Sort in one call: `get` fills one record per call and returns `false` at
/// end of input, `put` receives the records in sorted order.
pub fn sort_records<G, P>(
    config: SessionConfig,
    display: Option<DisplaySink>,
    mut get: G,
    mut put: P,
) -> Result<SortStats>
where
    G: FnMut(&mut [u8]) -> io::Result<bool>,
    P: FnMut(&[u8]) -> io::Result<()>,
{
    let mut session = Session::init(config, display)?;
    while get(session.put_slot()).map_err(SioError::Caller)? {
        session.put_commit()?;
    }
    while let Some(record) = session.next()? {
        put(record).map_err(SioError::Caller)?;
    }
    let stats = session.stats();
    session.exit();
    Ok(stats)
}
