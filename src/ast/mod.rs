/// AST (Abstract Syntax Tree) module
/// Contains the tree handed to the type engine by the external parser
///
/// Submodules:
/// - ast: Program, section, statement and expression definitions
/// - builder: Allocates node ids and positions while assembling a tree
pub mod ast;
pub mod builder;
