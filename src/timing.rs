use crate::util::*;

/// Reference per-cell timing surrogate values. The table is an input of the
/// engine (the loader may override it on the design context); cells absent
/// from the table score 0.
pub fn default_timing_table() -> Dict<String, float> {
    REFERENCE_TIMING.clone()
}

static REFERENCE_TIMING: Lazy<Dict<String, float>> = Lazy::new(|| {
    [
        ("SNPSHOPT25_FSDN_V2_1", 0.0121),
        ("SNPSHOPT25_FSDN_V2LP_1", 0.0154),
        ("SNPSHOPT25_FSDN2_V2_1", 0.0138),
        ("SNPSHOPT25_FSDN4_V2_1", 0.0146),
        ("SNPSLOPT25_FSDN_V2_1", 0.0188),
        ("SNPSLOPT25_FSDN2_V2_1", 0.0203),
        ("SNPSLOPT25_FSDN4_V2_1", 0.0214),
        ("SNPSHOPT25_FDPQ_V2_1", 0.0117),
        ("SNPSHOPT25_FDPQN_V2_1", 0.0119),
        ("SNPSHOPT25_LSRDPQ4_V2_1", 0.0152),
        ("SNPSLOPT25_LSRDPQ4_V2_1", 0.0217),
        ("SNPSSLOPT25_FSDN_V2_1", 0.0241),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect()
});
