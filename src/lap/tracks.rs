//! Known circuit lengths used to scale the distance detectors.

/// Length assumed when the track name is unknown.
pub const DEFAULT_TRACK_LENGTH_M: f32 = 5_000.0;

/// Lowercase name fragments and lengths in metres. Specific layouts come
/// before the circuit they belong to so substring matches pick the layout.
const TRACKS: &[(&str, f32)] = &[
    ("tsukuba", 2_045.0),
    ("brands hatch indy", 1_929.0),
    ("brands hatch", 3_908.0),
    ("suzuka circuit east", 2_243.0),
    ("suzuka", 5_807.0),
    ("nordschleife", 20_832.0),
    ("nurburgring gp", 5_148.0),
    ("nurburgring", 5_148.0),
    ("monza", 5_793.0),
    ("spa-francorchamps", 7_004.0),
    ("fuji", 4_563.0),
    ("autopolis", 4_674.0),
    ("deep forest", 4_258.0),
    ("trial mountain", 5_434.0),
    ("dragon trail gardens", 4_429.0),
    ("dragon trail", 5_209.0),
    ("tokyo expressway", 4_357.0),
    ("interlagos", 4_309.0),
    ("laguna seca", 3_602.0),
    ("mount panorama", 6_213.0),
    ("red bull ring", 4_318.0),
    ("daytona international speedway tri-oval", 4_023.0),
    ("daytona", 5_729.0),
    ("sarthe", 13_626.0),
    ("watkins glen", 5_435.0),
    ("kyoto driving park", 4_913.0),
    ("high speed ring", 3_999.0),
    ("goodwood", 3_809.0),
    ("willow springs", 4_023.0),
    ("sardegna", 5_108.0),
    ("barcelona", 4_655.0),
];

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace('ü', "u")
}

/// Look up a track by name.
///
/// Matching is case-insensitive: an exact key wins, otherwise the first key
/// contained in `name` is used.
pub fn lookup(name: &str) -> Option<f32> {
    let name = normalize(name);
    if name.is_empty() {
        return None;
    }
    TRACKS
        .iter()
        .find(|(key, _)| *key == name)
        .or_else(|| TRACKS.iter().find(|(key, _)| name.contains(key)))
        .map(|&(_, length)| length)
}

/// Estimated length for `name`, falling back to [`DEFAULT_TRACK_LENGTH_M`].
pub fn track_length(name: &str) -> f32 {
    lookup(name).unwrap_or(DEFAULT_TRACK_LENGTH_M)
}
