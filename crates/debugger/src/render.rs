//! Human-readable rendering of raw state values
//!
//! Values arrive as the traced program's in-memory bytes, so scalars are
//! decoded in native byte order. Types without a known layout are shown as
//! hex.

use transport::StateValue;

/// Element layouts of the scalar types the state walker reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    Boolean,
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Enum,
    Int64,
    UnsignedInt64,
    Float,
    Double,
}

impl Scalar {
    fn from_type_name(name: &str) -> Option<Self> {
        let name = name.trim_start_matches("const ").trim();
        let scalar = match name {
            "GLboolean" => Scalar::Boolean,
            "GLbyte" => Scalar::Byte,
            "GLubyte" => Scalar::UnsignedByte,
            "GLshort" => Scalar::Short,
            "GLushort" => Scalar::UnsignedShort,
            "GLint" | "GLsizei" => Scalar::Int,
            "GLuint" => Scalar::UnsignedInt,
            "GLenum" | "GLbitfield" => Scalar::Enum,
            "GLint64" | "GLintptr" | "GLsizeiptr" => Scalar::Int64,
            "GLuint64" => Scalar::UnsignedInt64,
            "GLfloat" | "GLclampf" => Scalar::Float,
            "GLdouble" | "GLclampd" => Scalar::Double,
            _ => return None,
        };
        Some(scalar)
    }

    fn size(self) -> usize {
        match self {
            Scalar::Boolean | Scalar::Byte | Scalar::UnsignedByte => 1,
            Scalar::Short | Scalar::UnsignedShort => 2,
            Scalar::Int | Scalar::UnsignedInt | Scalar::Enum | Scalar::Float => 4,
            Scalar::Int64 | Scalar::UnsignedInt64 | Scalar::Double => 8,
        }
    }

    fn format(self, bytes: &[u8]) -> String {
        macro_rules! native {
            ($ty:ty) => {
                <$ty>::from_ne_bytes(bytes.try_into().unwrap_or_default())
            };
        }
        match self {
            Scalar::Boolean => match bytes[0] {
                0 => "GL_FALSE".to_string(),
                1 => "GL_TRUE".to_string(),
                other => other.to_string(),
            },
            Scalar::Byte => native!(i8).to_string(),
            Scalar::UnsignedByte => bytes[0].to_string(),
            Scalar::Short => native!(i16).to_string(),
            Scalar::UnsignedShort => native!(u16).to_string(),
            Scalar::Int => native!(i32).to_string(),
            Scalar::UnsignedInt => native!(u32).to_string(),
            Scalar::Enum => format!("{:#06x}", native!(u32)),
            Scalar::Int64 => native!(i64).to_string(),
            Scalar::UnsignedInt64 => native!(u64).to_string(),
            Scalar::Float => native!(f32).to_string(),
            Scalar::Double => native!(f64).to_string(),
        }
    }
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

/// Render a state value the way the command line prints it
///
/// A length of `-1` or `1` is a scalar, a larger length an array shown in
/// braces. Text types print as text up to the first NUL.
pub fn render_value(value: &StateValue) -> String {
    if value.length == 0 {
        return String::new();
    }
    if value.is_invalid() {
        return "<GL error>".to_string();
    }

    let type_name = value.type_name.trim_start_matches("const ").trim();
    if type_name == "char" || type_name == "GLchar" {
        let text = value.data.split(|&b| b == 0).next().unwrap_or_default();
        return String::from_utf8_lossy(text).into_owned();
    }

    let Some(scalar) = Scalar::from_type_name(&value.type_name) else {
        return hex(&value.data);
    };
    let elements: Vec<String> = value
        .data
        .chunks_exact(scalar.size())
        .map(|chunk| scalar.format(chunk))
        .collect();

    match (value.length, elements.as_slice()) {
        (-1 | 1, [single]) => single.clone(),
        _ => format!("{{{}}}", elements.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(type_name: &str, length: i32, data: Vec<u8>) -> StateValue {
        StateValue::new(type_name, length, data)
    }

    #[test]
    fn empty_and_invalid() {
        assert_eq!(render_value(&value("GLint", 0, vec![])), "");
        assert_eq!(render_value(&StateValue::invalid()), "<GL error>");
    }

    #[test]
    fn scalars_are_native_endian() {
        let int = value("GLint", -1, (-3i32).to_ne_bytes().to_vec());
        assert_eq!(render_value(&int), "-3");

        let float = value("GLfloat", 1, 0.5f32.to_ne_bytes().to_vec());
        assert_eq!(render_value(&float), "0.5");

        let blend = value("GLboolean", 1, vec![1]);
        assert_eq!(render_value(&blend), "GL_TRUE");

        let func = value("GLenum", 1, 0x0207u32.to_ne_bytes().to_vec());
        assert_eq!(render_value(&func), "0x0207");
    }

    #[test]
    fn arrays_are_braced() {
        let data: Vec<u8> = [0.0f32, 0.25, 1.0, 1.0]
            .iter()
            .flat_map(|f| f.to_ne_bytes())
            .collect();
        let color = value("GLfloat", 4, data);
        assert_eq!(render_value(&color), "{0, 0.25, 1, 1}");
    }

    #[test]
    fn text_stops_at_nul() {
        let vendor = value("const GLchar", 9, b"Mesa\0junk".to_vec());
        assert_eq!(render_value(&vendor), "Mesa");
    }

    #[test]
    fn unknown_types_are_hex() {
        let opaque = value("GLsync", 1, vec![0xde, 0xad, 0x01]);
        assert_eq!(render_value(&opaque), "dead01");
    }
}
