/// Semantic role of an attribute, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Position,
    PackedColor,
    Rgb,
    Rgba,
    /// Carried only for its stride.
    Other,
}

impl AttributeKind {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "POSITION_CARTESIAN" | "POSITION" => AttributeKind::Position,
            "COLOR_PACKED" => AttributeKind::PackedColor,
            "RGB" | "RGB_PACKED" => AttributeKind::Rgb,
            "RGBA" | "RGBA_PACKED" => AttributeKind::Rgba,
            _ => AttributeKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointAttribute {
    pub name: String,
    pub kind: AttributeKind,
    pub num_elements: u16,
    pub byte_size: u16,
    pub range: Option<(f64, f64)>,
}

impl PointAttribute {
    pub fn new(name: impl Into<String>, byte_size: u16, num_elements: u16) -> Self {
        let name = name.into();
        Self {
            kind: AttributeKind::from_name(&name),
            name,
            num_elements,
            byte_size,
            range: None,
        }
    }

    pub fn with_range(mut self, range: Option<(f64, f64)>) -> Self {
        self.range = range;
        self
    }

    /// Size in bytes of a single element, e.g. 4 for an `int32` position.
    pub fn element_size(&self) -> usize {
        match self.num_elements {
            0 => self.byte_size as usize,
            n => self.byte_size as usize / n as usize,
        }
    }
}

/// Fixed-layout attributes of the Potree 1.x format.
struct LegacyAttributeType {
    name: &'static str,
    size: u16,
    num_elements: u16,
}

macro_rules! legacy_attribute {
    ($name:expr, $size:expr, $elements:expr) => {
        LegacyAttributeType {
            name: $name,
            size: $size,
            num_elements: $elements,
        }
    };
}

const LEGACY_ATTRIBUTES: &[LegacyAttributeType] = &[
    legacy_attribute!("POSITION_CARTESIAN", 12, 3),
    legacy_attribute!("COLOR_PACKED", 4, 4),
    legacy_attribute!("RGBA_PACKED", 4, 4),
    legacy_attribute!("RGBA", 4, 4),
    legacy_attribute!("RGB_PACKED", 3, 3),
    legacy_attribute!("RGB", 3, 3),
    legacy_attribute!("NORMAL_FLOATS", 12, 3),
    legacy_attribute!("NORMAL", 12, 3),
    legacy_attribute!("FILLER_1B", 1, 1),
    legacy_attribute!("INTENSITY", 2, 1),
    legacy_attribute!("CLASSIFICATION", 1, 1),
    legacy_attribute!("NORMAL_SPHEREMAPPED", 2, 2),
    legacy_attribute!("NORMAL_OCT16", 2, 2),
    legacy_attribute!("SOURCE_ID", 2, 1),
    legacy_attribute!("GPS_TIME", 8, 1),
    legacy_attribute!("INDICES", 4, 1),
    legacy_attribute!("SPACING", 4, 1),
];

/// Look up a v1 attribute by name, case-insensitively.
pub fn legacy_attribute(name: &str) -> Option<PointAttribute> {
    LEGACY_ATTRIBUTES
        .iter()
        .find(|attribute| attribute.name.eq_ignore_ascii_case(name))
        .map(|attribute| PointAttribute::new(attribute.name, attribute.size, attribute.num_elements))
}

/// Sum of the attribute sizes, the size of one fixed-layout record.
pub fn point_byte_size(attributes: &[PointAttribute]) -> usize {
    attributes.iter().map(|a| a.byte_size as usize).sum()
}
