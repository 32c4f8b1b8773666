//! Static gazetteer: known place phrases to IATA codes
//!
//! Place names that exist in more than one country are stored once per
//! reading, each with the context phrases (country, state, region) that
//! select it. A name with no context-free reading is *ambiguous*: the
//! gazetteer refuses to answer for it unless context is present, which is
//! what keeps "liberia" on its own away from both LIR and ROB.

use crate::normalize::route_tokens;
use crate::types::{AirportCandidate, Confidence, IataCode, RoutePair};
use std::collections::HashSet;
use std::ops::Range;
use std::sync::{Arc, OnceLock};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct AirportRecord {
    pub code: &'static str,
    pub name: &'static str,
    pub city: &'static str,
    pub country: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct GazetteerEntry {
    /// Normalized place phrase, e.g. "san jose"
    pub phrase: &'static str,
    /// Phrases that must co-occur for this reading; empty means context-free
    pub context: &'static [&'static str],
    pub airport: AirportRecord,
}

const fn entry(
    phrase: &'static str,
    context: &'static [&'static str],
    code: &'static str,
    name: &'static str,
    city: &'static str,
    country: &'static str,
) -> GazetteerEntry {
    GazetteerEntry {
        phrase,
        context,
        airport: AirportRecord { code, name, city, country },
    }
}

const COSTA_RICA: &[&str] = &["costa rica", "cr", "guanacaste"];
const SPAIN: &[&str] = &["spain", "spanien", "españa", "espana", "espagne"];

#[rustfmt::skip]
static BUILTIN_ENTRIES: &[GazetteerEntry] = &[
    // Cross-country name collisions
    entry("liberia", COSTA_RICA, "LIR", "Daniel Oduber Quirós International", "Liberia", "Costa Rica"),
    entry("liberia", &["monrovia", "west africa", "westafrika", "africa", "afrika"], "ROB", "Roberts International", "Monrovia", "Liberia"),
    entry("san jose", COSTA_RICA, "SJO", "Juan Santamaría International", "San José", "Costa Rica"),
    entry("san josé", COSTA_RICA, "SJO", "Juan Santamaría International", "San José", "Costa Rica"),
    entry("san jose", &["california", "kalifornien", "ca", "silicon valley", "bay area", "usa"], "SJC", "Norman Y. Mineta San José International", "San Jose", "United States"),
    entry("santiago", &["chile"], "SCL", "Arturo Merino Benítez International", "Santiago", "Chile"),
    entry("santiago", &["compostela", "galicia", "spain", "spanien", "españa", "espana"], "SCQ", "Santiago de Compostela", "Santiago de Compostela", "Spain"),
    entry("santiago", &["dominican republic", "dominikanische republik", "republica dominicana", "caballeros"], "STI", "Cibao International", "Santiago de los Caballeros", "Dominican Republic"),
    entry("cordoba", &["argentina", "argentinien"], "COR", "Ingeniero Ambrosio Taravella", "Córdoba", "Argentina"),
    entry("cordoba", SPAIN, "ODB", "Córdoba", "Córdoba", "Spain"),
    entry("valencia", SPAIN, "VLC", "Valencia", "Valencia", "Spain"),
    entry("valencia", &["venezuela"], "VLN", "Arturo Michelena International", "Valencia", "Venezuela"),
    entry("portland", &["oregon"], "PDX", "Portland International", "Portland", "United States"),
    entry("portland", &["maine"], "PWM", "Portland International Jetport", "Portland", "United States"),
    entry("birmingham", &["alabama", "al"], "BHM", "Birmingham-Shuttlesworth International", "Birmingham", "United States"),
    entry("birmingham", &["uk", "england", "united kingdom", "großbritannien", "grossbritannien"], "BHX", "Birmingham", "Birmingham", "United Kingdom"),
    entry("la paz", &["bolivia", "bolivien"], "LPB", "El Alto International", "La Paz", "Bolivia"),
    entry("la paz", &["mexico", "mexiko", "méxico", "baja", "baja california"], "LAP", "Manuel Márquez de León International", "La Paz", "Mexico"),
    entry("san juan", &["puerto rico"], "SJU", "Luis Muñoz Marín International", "San Juan", "Puerto Rico"),
    entry("san juan", &["argentina", "argentinien"], "UAQ", "Domingo Faustino Sarmiento", "San Juan", "Argentina"),
    entry("victoria", &["british columbia", "bc", "canada", "kanada"], "YYJ", "Victoria International", "Victoria", "Canada"),
    entry("victoria", &["seychelles", "seychellen", "mahe"], "SEZ", "Seychelles International", "Victoria", "Seychelles"),
    entry("st petersburg", &["russia", "russland"], "LED", "Pulkovo", "Saint Petersburg", "Russia"),
    entry("st petersburg", &["florida", "fl"], "PIE", "St. Pete-Clearwater International", "St. Petersburg", "United States"),
    entry("london", &["ontario", "canada", "kanada"], "YXU", "London International", "London", "Canada"),
    entry("london", &[], "LHR", "Heathrow", "London", "United Kingdom"),
    entry("paris", &["texas", "tx"], "PRX", "Cox Field", "Paris", "United States"),
    entry("paris", &[], "CDG", "Charles de Gaulle", "Paris", "France"),
    entry("sydney", &["nova scotia", "canada", "kanada"], "YQY", "J.A. Douglas McCurdy Sydney", "Sydney", "Canada"),
    entry("sydney", &[], "SYD", "Kingsford Smith", "Sydney", "Australia"),
    entry("manchester", &["new hampshire", "nh"], "MHT", "Manchester-Boston Regional", "Manchester", "United States"),
    entry("manchester", &[], "MAN", "Manchester", "Manchester", "United Kingdom"),
    entry("panama city", &["florida", "fl"], "ECP", "Northwest Florida Beaches International", "Panama City", "United States"),
    entry("panama city", &[], "PTY", "Tocumen International", "Panama City", "Panama"),
    entry("guadalajara", &[], "GDL", "Miguel Hidalgo y Costilla International", "Guadalajara", "Mexico"),

    // Unambiguous cities
    entry("frankfurt", &[], "FRA", "Frankfurt am Main", "Frankfurt", "Germany"),
    entry("munich", &[], "MUC", "Munich", "Munich", "Germany"),
    entry("münchen", &[], "MUC", "Munich", "Munich", "Germany"),
    entry("muenchen", &[], "MUC", "Munich", "Munich", "Germany"),
    entry("berlin", &[], "BER", "Berlin Brandenburg", "Berlin", "Germany"),
    entry("hamburg", &[], "HAM", "Hamburg", "Hamburg", "Germany"),
    entry("düsseldorf", &[], "DUS", "Düsseldorf", "Düsseldorf", "Germany"),
    entry("duesseldorf", &[], "DUS", "Düsseldorf", "Düsseldorf", "Germany"),
    entry("cologne", &[], "CGN", "Cologne Bonn", "Cologne", "Germany"),
    entry("köln", &[], "CGN", "Cologne Bonn", "Cologne", "Germany"),
    entry("stuttgart", &[], "STR", "Stuttgart", "Stuttgart", "Germany"),
    entry("vienna", &[], "VIE", "Vienna International", "Vienna", "Austria"),
    entry("wien", &[], "VIE", "Vienna International", "Vienna", "Austria"),
    entry("zurich", &[], "ZRH", "Zurich", "Zurich", "Switzerland"),
    entry("zürich", &[], "ZRH", "Zurich", "Zurich", "Switzerland"),
    entry("geneva", &[], "GVA", "Geneva", "Geneva", "Switzerland"),
    entry("genf", &[], "GVA", "Geneva", "Geneva", "Switzerland"),
    entry("amsterdam", &[], "AMS", "Schiphol", "Amsterdam", "Netherlands"),
    entry("madrid", &[], "MAD", "Adolfo Suárez Madrid-Barajas", "Madrid", "Spain"),
    entry("barcelona", &[], "BCN", "Josep Tarradellas Barcelona-El Prat", "Barcelona", "Spain"),
    entry("lisbon", &[], "LIS", "Humberto Delgado", "Lisbon", "Portugal"),
    entry("lissabon", &[], "LIS", "Humberto Delgado", "Lisbon", "Portugal"),
    entry("rome", &[], "FCO", "Leonardo da Vinci-Fiumicino", "Rome", "Italy"),
    entry("rom", &[], "FCO", "Leonardo da Vinci-Fiumicino", "Rome", "Italy"),
    entry("milan", &[], "MXP", "Milan Malpensa", "Milan", "Italy"),
    entry("mailand", &[], "MXP", "Milan Malpensa", "Milan", "Italy"),
    entry("new york", &[], "JFK", "John F. Kennedy International", "New York", "United States"),
    entry("los angeles", &[], "LAX", "Los Angeles International", "Los Angeles", "United States"),
    entry("san francisco", &[], "SFO", "San Francisco International", "San Francisco", "United States"),
    entry("chicago", &[], "ORD", "O'Hare International", "Chicago", "United States"),
    entry("miami", &[], "MIA", "Miami International", "Miami", "United States"),
    entry("toronto", &[], "YYZ", "Toronto Pearson International", "Toronto", "Canada"),
    entry("mexico city", &[], "MEX", "Benito Juárez International", "Mexico City", "Mexico"),
    entry("mexiko stadt", &[], "MEX", "Benito Juárez International", "Mexico City", "Mexico"),
    entry("cancun", &[], "CUN", "Cancún International", "Cancún", "Mexico"),
    entry("cancún", &[], "CUN", "Cancún International", "Cancún", "Mexico"),
    entry("bogota", &[], "BOG", "El Dorado International", "Bogotá", "Colombia"),
    entry("bogotá", &[], "BOG", "El Dorado International", "Bogotá", "Colombia"),
    entry("lima", &[], "LIM", "Jorge Chávez International", "Lima", "Peru"),
    entry("havana", &[], "HAV", "José Martí International", "Havana", "Cuba"),
    entry("monrovia", &[], "ROB", "Roberts International", "Monrovia", "Liberia"),
    entry("dubai", &[], "DXB", "Dubai International", "Dubai", "United Arab Emirates"),
    entry("singapore", &[], "SIN", "Changi", "Singapore", "Singapore"),
    entry("singapur", &[], "SIN", "Changi", "Singapore", "Singapore"),
    entry("bangkok", &[], "BKK", "Suvarnabhumi", "Bangkok", "Thailand"),
    entry("tokyo", &[], "HND", "Haneda", "Tokyo", "Japan"),
    entry("tokio", &[], "HND", "Haneda", "Tokyo", "Japan"),
];

/// Words that separate the origin segment from the destination segment
const SEPARATORS: &[&str] = &["to", "nach", "naar", "para", "hacia", "vers", "towards"];

/// Words that mark the following place as the origin when no separator is present
const FROM_WORDS: &[&str] = &["from", "von", "ab", "desde", "de", "depuis"];

/// Words that carry no place information in a route query
const FILLER: &[&str] = &[
    "flights", "flight", "flug", "flüge", "fluege", "vuelos", "vuelo", "vols", "vol",
    "cheap", "billige", "günstige", "i", "ich", "want", "möchte", "would", "like", "need",
    "fly", "go", "book", "a", "an", "the", "one", "way", "return", "me", "please", "bitte",
    "for", "für", "looking", "search", "trip", "travel", "reise", "reisen", "from", "von",
    "ab", "desde", "de", "depuis", "airport", "flughafen",
];

/// Result of a gazetteer lookup
pub type GazetteerMatch = RoutePair;

/// Immutable place-phrase table
pub struct StaticGazetteer {
    entries: Vec<GazetteerEntry>,
    /// Distinct phrases, longest (in tokens) first
    phrases: Vec<&'static str>,
}

impl StaticGazetteer {
    pub fn new(entries: Vec<GazetteerEntry>) -> Self {
        let mut seen = HashSet::new();
        let mut phrases: Vec<&'static str> = entries
            .iter()
            .map(|e| e.phrase)
            .filter(|p| seen.insert(*p))
            .collect();
        phrases.sort_by_key(|p| std::cmp::Reverse(p.split(' ').count()));
        Self { entries, phrases }
    }

    /// Process-wide built-in table, built on first use
    pub fn builtin() -> Arc<StaticGazetteer> {
        static GAZETTEER: OnceLock<Arc<StaticGazetteer>> = OnceLock::new();
        GAZETTEER
            .get_or_init(|| Arc::new(StaticGazetteer::new(BUILTIN_ENTRIES.to_vec())))
            .clone()
    }

    /// All codes the table can produce
    pub fn known_codes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.airport.code)
    }

    /// Resolve a query to a route, or `None` when the table cannot answer it
    /// with certainty (unknown places, unresolved ambiguous names, or no
    /// destination).
    pub fn lookup(&self, query: &str) -> Option<GazetteerMatch> {
        let tokens = route_tokens(query);
        if tokens.is_empty() {
            return None;
        }

        let route = match tokens.iter().position(|t| SEPARATORS.contains(&t.as_str())) {
            Some(sep) => {
                let origin_seg = self.analyze(&tokens[..sep]);
                let dest_seg = self.analyze(&tokens[sep + 1..]);
                if origin_seg.ambiguous || dest_seg.ambiguous {
                    debug!("Gazetteer: ambiguous place name in '{}'", query);
                    return None;
                }
                let destination = dest_seg.resolved.into_iter().next()?;
                let origin = origin_seg.resolved.into_iter().next();
                if origin.is_none() && origin_seg.has_unknown_content {
                    return None;
                }
                RoutePair {
                    origin,
                    destination: Some(destination),
                }
            }
            None => {
                let seg = self.analyze(&tokens);
                if seg.ambiguous {
                    debug!("Gazetteer: ambiguous place name in '{}'", query);
                    return None;
                }
                let mut resolved = seg.resolved.into_iter();
                match (resolved.next(), resolved.next()) {
                    (Some(first), Some(second)) => RoutePair {
                        origin: Some(first),
                        destination: Some(second),
                    },
                    (Some(only), None) if !seg.first_is_origin => RoutePair {
                        origin: None,
                        destination: Some(only),
                    },
                    _ => return None,
                }
            }
        };

        if let (Some(origin), Some(destination)) = (&route.origin, &route.destination) {
            if origin.code == destination.code {
                debug!("Gazetteer: '{}' names {} at both ends", query, origin.code);
                return None;
            }
        }
        Some(route)
    }

    /// Find and resolve place phrases in one route segment
    fn analyze(&self, tokens: &[String]) -> SegmentAnalysis {
        let mut covered = vec![false; tokens.len()];
        let mut hits: Vec<(usize, usize, &'static str)> = Vec::new();

        for phrase in &self.phrases {
            let words: Vec<&str> = phrase.split(' ').collect();
            if words.len() > tokens.len() {
                continue;
            }
            for start in 0..=(tokens.len() - words.len()) {
                let span = start..start + words.len();
                if covered[span.clone()].iter().any(|c| *c) {
                    continue;
                }
                if tokens[span.clone()].iter().zip(&words).all(|(t, w)| t == w) {
                    covered[span].iter_mut().for_each(|c| *c = true);
                    hits.push((start, words.len(), *phrase));
                }
            }
        }
        hits.sort_by_key(|(start, _, _)| *start);

        let readings: Vec<Option<(AirportRecord, Option<Range<usize>>)>> = hits
            .iter()
            .map(|(start, len, phrase)| self.resolve_phrase(phrase, tokens, *start, *len))
            .collect();
        let context_spans: Vec<(usize, Range<usize>)> = readings
            .iter()
            .enumerate()
            .filter_map(|(i, r)| Some((i, r.as_ref()?.1.clone()?)))
            .collect();
        for (_, span) in &context_spans {
            covered[span.clone()].iter_mut().for_each(|c| *c = true);
        }

        let mut analysis = SegmentAnalysis::default();
        let mut first = true;
        for (i, ((start, len, _), reading)) in hits.iter().zip(readings).enumerate() {
            // A place name that decided another name's reading is not a place of its own
            let used_as_context = context_spans
                .iter()
                .any(|(owner, span)| *owner != i && span.start < start + len && *start < span.end);
            if used_as_context {
                continue;
            }
            if first && *start > 0 {
                analysis.first_is_origin = FROM_WORDS.contains(&tokens[start - 1].as_str());
            }
            first = false;
            match reading.and_then(|(airport, _)| to_candidate(&airport)) {
                Some(candidate) => analysis.resolved.push(candidate),
                None => analysis.ambiguous = true,
            }
        }

        analysis.has_unknown_content = tokens
            .iter()
            .zip(&covered)
            .any(|(t, c)| !c && !FILLER.contains(&t.as_str()) && !SEPARATORS.contains(&t.as_str()));
        analysis
    }

    /// Pick the reading of `phrase` whose context appears elsewhere in the
    /// segment, else its context-free reading. Also returns the token span of
    /// the context that decided it.
    fn resolve_phrase(
        &self,
        phrase: &str,
        tokens: &[String],
        start: usize,
        len: usize,
    ) -> Option<(AirportRecord, Option<Range<usize>>)> {
        let readings = self.entries.iter().filter(|e| e.phrase == phrase);
        let mut fallback = None;

        for reading in readings {
            if reading.context.is_empty() {
                fallback.get_or_insert(reading.airport);
                continue;
            }
            for ctx in reading.context {
                if let Some(at) = find_phrase(tokens, ctx, start, len) {
                    let ctx_len = ctx.split(' ').count();
                    return Some((reading.airport, Some(at..at + ctx_len)));
                }
            }
        }
        fallback.map(|airport| (airport, None))
    }
}

#[derive(Debug, Default)]
struct SegmentAnalysis {
    resolved: Vec<AirportCandidate>,
    ambiguous: bool,
    has_unknown_content: bool,
    first_is_origin: bool,
}

/// Locate `phrase` in `tokens`, skipping the span `[skip, skip + skip_len)`
fn find_phrase(tokens: &[String], phrase: &str, skip: usize, skip_len: usize) -> Option<usize> {
    let words: Vec<&str> = phrase.split(' ').collect();
    if words.len() > tokens.len() {
        return None;
    }
    (0..=(tokens.len() - words.len())).find(|&start| {
        let end = start + words.len();
        let overlaps = start < skip + skip_len && skip < end;
        !overlaps && tokens[start..end].iter().zip(&words).all(|(t, w)| t == w)
    })
}

fn to_candidate(airport: &AirportRecord) -> Option<AirportCandidate> {
    let code = IataCode::parse(airport.code)?;
    Some(AirportCandidate {
        code,
        display_name: airport.name.to_string(),
        city_name: airport.city.to_string(),
        country_name: airport.country.to_string(),
        confidence: Confidence::High,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(m: &GazetteerMatch) -> (Option<&str>, Option<&str>) {
        (
            m.origin.as_ref().map(|c| c.code.as_str()),
            m.destination.as_ref().map(|c| c.code.as_str()),
        )
    }

    #[test]
    fn test_all_builtin_codes_are_well_formed() {
        for code in StaticGazetteer::builtin().known_codes() {
            assert!(IataCode::parse(code).is_some(), "bad code {}", code);
        }
    }

    #[test]
    fn test_liberia_with_costa_rica_context() {
        let m = StaticGazetteer::builtin()
            .lookup("Frankfurt nach costa rica liberia")
            .unwrap();
        assert_eq!(codes(&m), (Some("FRA"), Some("LIR")));
        assert_eq!(m.destination.unwrap().confidence, Confidence::High);
    }

    #[test]
    fn test_liberia_context_order_does_not_matter() {
        let m = StaticGazetteer::builtin()
            .lookup("from Frankfurt to Liberia, Costa Rica")
            .unwrap();
        assert_eq!(codes(&m), (Some("FRA"), Some("LIR")));
    }

    #[test]
    fn test_san_jose_costa_rica_is_not_california() {
        let m = StaticGazetteer::builtin().lookup("san jose costa rica").unwrap();
        assert_eq!(codes(&m), (None, Some("SJO")));
    }

    #[test]
    fn test_san_jose_california() {
        let m = StaticGazetteer::builtin().lookup("flights to San Jose California").unwrap();
        assert_eq!(codes(&m), (None, Some("SJC")));
    }

    #[test]
    fn test_bare_ambiguous_name_is_a_miss() {
        assert!(StaticGazetteer::builtin().lookup("Flüge nach Liberia").is_none());
        assert!(StaticGazetteer::builtin().lookup("san jose").is_none());
    }

    #[test]
    fn test_generic_reading_with_override() {
        let g = StaticGazetteer::builtin();
        assert_eq!(codes(&g.lookup("Berlin to London").unwrap()), (Some("BER"), Some("LHR")));
        assert_eq!(
            codes(&g.lookup("Toronto to London Ontario").unwrap()),
            (Some("YYZ"), Some("YXU"))
        );
    }

    #[test]
    fn test_unknown_origin_defers() {
        // "Gotham" is not in the table; the route must not be half-answered
        assert!(StaticGazetteer::builtin().lookup("Gotham to Berlin").is_none());
    }

    #[test]
    fn test_filler_words_are_ignored() {
        let m = StaticGazetteer::builtin().lookup("cheap flights to Wien").unwrap();
        assert_eq!(codes(&m), (None, Some("VIE")));
    }

    #[test]
    fn test_no_separator_two_places() {
        let m = StaticGazetteer::builtin().lookup("Madrid Lima").unwrap();
        assert_eq!(codes(&m), (Some("MAD"), Some("LIM")));
    }

    #[test]
    fn test_origin_only_is_a_miss() {
        assert!(StaticGazetteer::builtin().lookup("flights from Hamburg").is_none());
    }

    #[test]
    fn test_arrow_separator() {
        let m = StaticGazetteer::builtin().lookup("München → Zürich").unwrap();
        assert_eq!(codes(&m), (Some("MUC"), Some("ZRH")));
    }

    #[test]
    fn test_context_place_is_not_a_second_stop() {
        let m = StaticGazetteer::builtin().lookup("Monrovia Liberia").unwrap();
        assert_eq!(codes(&m), (None, Some("ROB")));
    }

    #[test]
    fn test_same_airport_both_ends_is_a_miss() {
        assert!(StaticGazetteer::builtin().lookup("Berlin to Berlin").is_none());
        assert!(StaticGazetteer::builtin().lookup("Madrid Madrid").is_none());
    }

    #[test]
    fn test_longest_phrase_wins() {
        let m = StaticGazetteer::builtin().lookup("to panama city florida").unwrap();
        assert_eq!(codes(&m), (None, Some("ECP")));
    }
}
