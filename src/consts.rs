// Well-known internal names the lowering rules refer to directly.

pub const JAVA_LANG_OBJECT: &str = "java/lang/Object";
pub const JAVA_LANG_STRING: &str = "java/lang/String";
pub const JAVA_LANG_CLASS: &str = "java/lang/Class";
pub const JAVA_LANG_THROWABLE: &str = "java/lang/Throwable";
pub const JAVA_LANG_ASSERTION_ERROR: &str = "java/lang/AssertionError";

// Constructor name as stored in class files (JVMS 2.9)
pub const CONSTRUCTOR_NAME: &str = "<init>";
