//! Split one award across the domains a habit declares.

use serde::{Deserialize, Serialize};

use crate::constants::GENERAL_DOMAIN_CODE;
use crate::domain::DomainCatalog;

/// One domain's portion of an award.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainShare {
    pub domain_code: String,
    pub domain_name: String,
    pub points: u64,
    pub proportion: f64,
}

/// Distribute `total_points` across `domain_codes`.
///
/// An absent or empty list maps to the General domain alone. Any non-empty
/// list is explicit, whatever its contents, and is split evenly entry by
/// entry; duplicates each receive their own share. The integer remainder of
/// an uneven split goes to the first entry, so the shares always sum to
/// `total_points` exactly.
pub fn distribute(
    total_points: u64,
    domain_codes: Option<&[String]>,
    catalog: &DomainCatalog,
) -> Vec<DomainShare> {
    let codes = match domain_codes {
        Some(codes) if !codes.is_empty() => codes,
        _ => {
            return vec![DomainShare {
                domain_code: GENERAL_DOMAIN_CODE.to_string(),
                domain_name: catalog.name_for(GENERAL_DOMAIN_CODE),
                points: total_points,
                proportion: 1.0,
            }];
        }
    };

    let n = codes.len() as u64;
    let even = total_points / n;
    let remainder = total_points % n;
    let proportion = 1.0 / n as f64;

    codes
        .iter()
        .enumerate()
        .map(|(i, code)| DomainShare {
            domain_code: code.clone(),
            domain_name: catalog.name_for(code),
            points: if i == 0 { even + remainder } else { even },
            proportion,
        })
        .collect()
}
