//! Location splitting and country resolution.

/// Country names and common aliases to ISO-3166 alpha-2.
///
/// Lookup is case-insensitive on the full token. Far from exhaustive;
/// the AI normalizer picks up what this table misses.
static COUNTRY_TABLE: &[(&str, &str)] = &[
    ("afghanistan", "AF"),
    ("bangladesh", "BD"),
    ("belgium", "BE"),
    ("burkina faso", "BF"),
    ("cameroon", "CM"),
    ("canada", "CA"),
    ("central african republic", "CF"),
    ("chad", "TD"),
    ("colombia", "CO"),
    ("democratic republic of the congo", "CD"),
    ("drc", "CD"),
    ("dr congo", "CD"),
    ("denmark", "DK"),
    ("egypt", "EG"),
    ("ethiopia", "ET"),
    ("france", "FR"),
    ("germany", "DE"),
    ("ghana", "GH"),
    ("greece", "GR"),
    ("haiti", "HT"),
    ("india", "IN"),
    ("indonesia", "ID"),
    ("iraq", "IQ"),
    ("italy", "IT"),
    ("ivory coast", "CI"),
    ("cote d'ivoire", "CI"),
    ("côte d'ivoire", "CI"),
    ("jordan", "JO"),
    ("kenya", "KE"),
    ("lebanon", "LB"),
    ("liberia", "LR"),
    ("libya", "LY"),
    ("madagascar", "MG"),
    ("malawi", "MW"),
    ("mali", "ML"),
    ("mauritania", "MR"),
    ("mexico", "MX"),
    ("mozambique", "MZ"),
    ("myanmar", "MM"),
    ("nepal", "NP"),
    ("netherlands", "NL"),
    ("niger", "NE"),
    ("nigeria", "NG"),
    ("norway", "NO"),
    ("pakistan", "PK"),
    ("philippines", "PH"),
    ("senegal", "SN"),
    ("sierra leone", "SL"),
    ("somalia", "SO"),
    ("south africa", "ZA"),
    ("south sudan", "SS"),
    ("spain", "ES"),
    ("sudan", "SD"),
    ("sweden", "SE"),
    ("switzerland", "CH"),
    ("syria", "SY"),
    ("syrian arab republic", "SY"),
    ("tanzania", "TZ"),
    ("thailand", "TH"),
    ("turkey", "TR"),
    ("türkiye", "TR"),
    ("uganda", "UG"),
    ("ukraine", "UA"),
    ("united kingdom", "GB"),
    ("uk", "GB"),
    ("united states", "US"),
    ("usa", "US"),
    ("united states of america", "US"),
    ("venezuela", "VE"),
    ("yemen", "YE"),
    ("zambia", "ZM"),
    ("zimbabwe", "ZW"),
];

/// Split of a raw location string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationParts {
    pub city: Option<String>,
    pub country: Option<String>,
    pub country_iso: Option<String>,
}

/// Resolve a country name, alias, or alpha-2 code.
pub fn country_iso(token: &str) -> Option<&'static str> {
    let token = token.trim().to_lowercase();
    if token.len() == 2 {
        // Trust bare alpha-2 codes that appear in our table's values.
        let upper = token.to_uppercase();
        if COUNTRY_TABLE.iter().any(|(_, iso)| *iso == upper) {
            return COUNTRY_TABLE
                .iter()
                .find(|(_, iso)| *iso == upper)
                .map(|(_, iso)| *iso);
        }
    }
    COUNTRY_TABLE
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, iso)| *iso)
}

/// Full country name for an ISO code, for display.
pub fn country_name(iso: &str) -> Option<&'static str> {
    // First table entry wins; aliases come after the canonical name.
    COUNTRY_TABLE
        .iter()
        .find(|(_, code)| *code == iso)
        .map(|(name, _)| *name)
}

/// Split "City, Country" style strings. Multi-location and slashed
/// strings ("Lagos / Remote") are left for the AI normalizer.
pub fn split_location(raw: &str) -> LocationParts {
    let raw = raw.trim();
    if raw.is_empty() {
        return LocationParts::default();
    }

    let segments: Vec<&str> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [] => LocationParts::default(),
        [single] => {
            // A lone token may itself be a country.
            if let Some(iso) = country_iso(single) {
                LocationParts {
                    city: None,
                    country: country_name(iso).map(title_case),
                    country_iso: Some(iso.to_string()),
                }
            } else {
                LocationParts {
                    city: Some((*single).to_string()),
                    country: None,
                    country_iso: None,
                }
            }
        }
        [city, rest @ ..] => {
            let last = rest.last().expect("rest is non-empty");
            let iso = country_iso(last);
            LocationParts {
                city: Some((*city).to_string()),
                country: iso
                    .and_then(country_name)
                    .map(title_case)
                    .or_else(|| Some((*last).to_string())),
                country_iso: iso.map(str::to_string),
            }
        }
    }
}

/// Is this string too tangled for the heuristics (multiple venues,
/// alternates, remote-or)?
pub fn is_ambiguous(raw: &str) -> bool {
    let raw = raw.trim();
    raw.contains('/') || raw.contains(" or ") || raw.matches(',').count() > 2
}

fn title_case(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
