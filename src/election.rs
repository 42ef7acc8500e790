//! Leader selection over an election directory
//!
//! Every candidate registers one ephemeral-sequential node named
//! `<prefix><sequence>` under the election directory. The surviving node with
//! the smallest sequence number is the leader.

use crate::error::{Error, Result};

/// Name prefix of election member nodes
pub const DEFAULT_MEMBER_PREFIX: &str = "member_";

/// A child node that carries the member prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionMember<'a> {
    pub name: &'a str,
    pub sequence: u64,
}

impl<'a> ElectionMember<'a> {
    /// Parse a child name
    ///
    /// Returns `Ok(None)` for names without the prefix and an error when the
    /// text after the prefix is not a non-negative integer.
    pub fn parse(name: &'a str, prefix: &str) -> Result<Option<Self>> {
        let Some((_, suffix)) = name.split_once(prefix) else {
            return Ok(None);
        };

        let sequence = suffix
            .parse::<u64>()
            .map_err(|source| Error::InvalidMember {
                name: name.to_string(),
                source,
            })?;

        Ok(Some(Self { name, sequence }))
    }
}

/// Pick the member with the lowest sequence number
///
/// Ties keep the first member scanned.
pub fn select_leader<'a, I>(children: I, prefix: &str) -> Result<ElectionMember<'a>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut leader: Option<ElectionMember<'a>> = None;

    for child in children {
        let Some(member) = ElectionMember::parse(child, prefix)? else {
            continue;
        };

        match &leader {
            Some(current) if current.sequence <= member.sequence => {}
            _ => leader = Some(member),
        }
    }

    leader.ok_or_else(|| Error::NotFound("no leader node".to_string()))
}

/// Full path of the leader node under `directory`
pub fn leader_node_path<S: AsRef<str>>(
    directory: &str,
    children: &[S],
    prefix: &str,
) -> Result<String> {
    let leader = select_leader(children.iter().map(|c| c.as_ref()), prefix)?;
    Ok(join_path(directory, leader.name))
}

/// Join a parent path and a child name with exactly one separator
pub fn join_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('/');
    format!("{parent}/{child}")
}
