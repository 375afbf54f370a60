use ndarray::ArrayD;

/// A decoded MATLAB array.
///
/// Numeric classes of every width, including logical arrays, are widened to
/// `f64` and kept in MATLAB's column-major layout.
#[derive(Clone, Debug, PartialEq)]
pub enum MatValue {
    Numeric(ArrayD<f64>),
    Char(String),
    Cell(MatCell),
    Struct(MatStruct),
}

impl MatValue {
    pub fn as_numeric(&self) -> Option<&ArrayD<f64>> {
        match self {
            MatValue::Numeric(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<&str> {
        match self {
            MatValue::Char(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_cell(&self) -> Option<&MatCell> {
        match self {
            MatValue::Cell(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&MatStruct> {
        match self {
            MatValue::Struct(st) => Some(st),
            _ => None,
        }
    }

    /// MATLAB-style class name, for error messages.
    pub fn class_name(&self) -> &'static str {
        match self {
            MatValue::Numeric(_) => "numeric",
            MatValue::Char(_) => "char",
            MatValue::Cell(_) => "cell",
            MatValue::Struct(_) => "struct",
        }
    }
}

/// A cell array; items are stored in column-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct MatCell {
    pub(crate) shape: Vec<usize>,
    pub(crate) items: Vec<MatValue>,
}

impl MatCell {
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MatValue> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MatValue> {
        self.items.iter()
    }
}

/// A struct array. Every element has a value for every field.
#[derive(Clone, Debug, PartialEq)]
pub struct MatStruct {
    pub(crate) shape: Vec<usize>,
    pub(crate) field_names: Vec<String>,
    pub(crate) len: usize,
    /// Field values element by element, in column-major element order.
    pub(crate) values: Vec<MatValue>,
}

impl MatStruct {
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_names.iter().any(|f| f == name)
    }

    /// Number of elements in the struct array.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value of field `name` in element `index`.
    pub fn field_at(&self, index: usize, name: &str) -> Option<&MatValue> {
        if index >= self.len {
            return None;
        }
        let pos = self.field_names.iter().position(|f| f == name)?;
        self.values.get(index * self.field_names.len() + pos)
    }

    /// Value of field `name` in the first element; the usual access for a
    /// scalar struct such as `beam`.
    pub fn field(&self, name: &str) -> Option<&MatValue> {
        self.field_at(0, name)
    }
}
