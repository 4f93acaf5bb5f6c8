//! Finding a free task in the dropdown option tree.

use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::portal::{DropdownLevel, OptionSource, PortalError};
use crate::progress::TaskKey;

pub(crate) type IsFree<'a> = &'a (dyn Fn(&TaskKey) -> bool + Sync);

/// Nested enumeration in option order, doc numbers ascending. Returns the
/// first combination `is_free` accepts, or `None` once the tree is exhausted.
///
/// A subtree whose options cannot be read is skipped; only fatal errors end
/// the walk.
pub(crate) async fn exhaustive(
    source: &dyn OptionSource,
    doc_numbers: RangeInclusive<u32>,
    is_free: IsFree<'_>,
) -> Result<Option<TaskKey>, PortalError> {
    for year in options_or_skip(source, DropdownLevel::Year, &[]).await? {
        let path = vec![year];
        for district in options_or_skip(source, DropdownLevel::District, &path).await? {
            let path = [path.clone(), vec![district]].concat();
            for taluka in options_or_skip(source, DropdownLevel::Taluka, &path).await? {
                let path = [path.clone(), vec![taluka]].concat();
                for village in options_or_skip(source, DropdownLevel::Village, &path).await? {
                    if let Some(task) = first_free_doc(&path, &village, doc_numbers.clone(), is_free)
                    {
                        return Ok(Some(task));
                    }
                }
            }
        }
    }
    Ok(None)
}

/// Options at `level`, or none when a non-fatal error hides them.
async fn options_or_skip(
    source: &dyn OptionSource,
    level: DropdownLevel,
    parents: &[String],
) -> Result<Vec<String>, PortalError> {
    match source.options(level, parents).await {
        Ok(options) => Ok(options),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("Skipping {} options under {:?}: {}", level, parents, e);
            Ok(Vec::new())
        }
    }
}

fn first_free_doc(
    path: &[String],
    village: &str,
    doc_numbers: RangeInclusive<u32>,
    is_free: IsFree<'_>,
) -> Option<TaskKey> {
    for doc_number in doc_numbers {
        match task_at(path, village, doc_number) {
            Some(task) if is_free(&task) => return Some(task),
            Some(_) => {}
            // an unusable name is unusable for every doc number
            None => return None,
        }
    }
    None
}

/// Uniform choice at every level, `probes` times. `None` means no free
/// combination was hit, not that none exists.
pub(crate) async fn random(
    source: &dyn OptionSource,
    doc_numbers: RangeInclusive<u32>,
    probes: u32,
    rng: &mut StdRng,
    is_free: IsFree<'_>,
) -> Result<Option<TaskKey>, PortalError> {
    'probe: for probe in 1..=probes {
        let mut path: Vec<String> = Vec::with_capacity(4);
        for level in DropdownLevel::ALL {
            let options = match source.options(level, &path).await {
                Ok(options) => options,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Random draw {} could not read {} options: {}", probe, level, e);
                    continue 'probe;
                }
            };
            match options.choose(rng) {
                Some(choice) => path.push(choice.clone()),
                None if level == DropdownLevel::Year => return Ok(None),
                None => continue 'probe,
            }
        }

        let doc_number = rng.gen_range(doc_numbers.clone());
        let Some(village) = path.pop() else {
            continue;
        };
        if let Some(task) = task_at(&path, &village, doc_number) {
            if is_free(&task) {
                debug!("Random discovery hit {} on probe {}", task, probe);
                return Ok(Some(task));
            }
        }
    }
    Ok(None)
}

fn task_at(path: &[String], village: &str, doc_number: u32) -> Option<TaskKey> {
    let [year, district, taluka] = path else {
        return None;
    };
    match TaskKey::new(year.as_str(), district.as_str(), taluka.as_str(), village, doc_number) {
        Ok(task) => Some(task),
        Err(e) => {
            warn!("Skipping combination that cannot form a task key: {}", e);
            None
        }
    }
}
