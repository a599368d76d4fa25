//! Header/parameter transformation and path rewriting
//!
//! Rules are looked up against the first host entry whose name matches; a
//! request for an unconfigured host passes through unchanged.

use std::collections::HashMap;

use crate::config::{HostConfig, RuleInstruction};

/// Which rule block of a host entry to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Header,
    Param,
}

/// Apply the matching host entry's header or param instructions to `fields`,
/// in declared order. `add` merges with overwrite on collision; `remove`
/// deletes keys, silently skipping absent ones.
///
/// Header names match case-insensitively (HTTP header names carry no case;
/// the listener's `HeaderMap` yields them lowercased, while rule blocks are
/// written in natural casing). Param names are case-sensitive.
pub fn apply_field_rules(
    hosts: &[HostConfig],
    host: &str,
    mut fields: HashMap<String, String>,
    kind: RuleKind,
) -> HashMap<String, String> {
    let Some(entry) = hosts.iter().find(|e| e.host == host) else {
        return fields;
    };

    let instructions = match kind {
        RuleKind::Header => &entry.header_rules,
        RuleKind::Param => &entry.param_rules,
    };

    for instruction in instructions {
        match instruction {
            RuleInstruction::Add(additions) => {
                for (name, value) in additions {
                    // Drop differently-cased duplicates first so one logical
                    // header never ends up twice in the forwarded set.
                    remove_field(&mut fields, name, kind);
                    fields.insert(name.clone(), value.clone());
                }
            }
            RuleInstruction::Remove(names) => {
                for name in names {
                    remove_field(&mut fields, name, kind);
                }
            }
        }
    }

    fields
}

fn remove_field(fields: &mut HashMap<String, String>, name: &str, kind: RuleKind) {
    match kind {
        RuleKind::Header => fields.retain(|existing, _| !existing.eq_ignore_ascii_case(name)),
        RuleKind::Param => {
            fields.remove(name);
        }
    }
}

/// Rewrite `path` using the matching host entry's first declared replace
/// pair: the first occurrence of `from` is replaced with `to` (plain
/// substring, not a regex). Later pairs are ignored; one rewrite rule per
/// host is the documented contract.
///
/// Returns `None` when no host entry matches or the entry declares no
/// replace pairs.
pub fn apply_rewrite(hosts: &[HostConfig], host: &str, path: &str) -> Option<String> {
    let entry = hosts.iter().find(|e| e.host == host)?;
    let pair = entry.rewrite_rules.as_ref()?.replace.first()?;
    Some(path.replacen(&pair.from, &pair.to, 1))
}
